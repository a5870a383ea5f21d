use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ventus_attest::AttestConfig;
use ventus_core::KeyTag;

/// Key directory used when `--key-dir` is not given
pub const DEFAULT_KEY_DIR: &str = ".ventus/keys";

#[derive(Debug, Parser)]
#[command(name = "ventus", version, about = "Device-bound media attestation")]
pub struct Cli {
    /// TOML file with attestation settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the software key store
    #[arg(long, global = true, default_value = DEFAULT_KEY_DIR)]
    pub key_dir: PathBuf,

    /// Key tag, overriding the config file
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Human-readable log output instead of JSONL
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the public key, generating the key on first use
    Pubkey,
    /// Print the digest of an image's canonical encoding
    Digest {
        /// Image file
        image: PathBuf,
    },
    /// Sign an image after confirming on the terminal
    Sign {
        /// Image file
        image: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Sign an image and print the circuit inputs as JSON
    Inputs {
        /// Image file
        image: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Delete the signing key for the tag
    ResetKey,
}

impl Command {
    /// Whether consent was given up front on the command line
    pub fn pre_approved(&self) -> bool {
        match self {
            Command::Sign { yes, .. } | Command::Inputs { yes, .. } => *yes,
            _ => false,
        }
    }
}

impl Cli {
    /// Attestation settings from `--config`, with command-line overrides
    pub fn attest_config(&self) -> anyhow::Result<AttestConfig> {
        let mut config = match &self.config {
            Some(path) => AttestConfig::from_toml_file(path)?,
            None => AttestConfig::default(),
        };
        if let Some(tag) = &self.tag {
            config = config.with_key_tag(KeyTag::new(tag.clone())?);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sign_with_globals() {
        let cli = Cli::try_parse_from([
            "ventus",
            "sign",
            "photo.png",
            "--yes",
            "--tag",
            "org.example.cam",
            "--key-dir",
            "/tmp/keys",
        ])
        .unwrap();

        assert!(cli.command.pre_approved());
        assert_eq!(cli.key_dir, PathBuf::from("/tmp/keys"));
        match &cli.command {
            Command::Sign { image, .. } => assert_eq!(image, &PathBuf::from("photo.png")),
            other => panic!("unexpected command {other:?}"),
        }

        let config = cli.attest_config().unwrap();
        assert_eq!(config.key_tag.as_str(), "org.example.cam");
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ventus", "pubkey"]).unwrap();
        assert_eq!(cli.key_dir, PathBuf::from(DEFAULT_KEY_DIR));
        assert_eq!(cli.log_level, "warn");
        assert!(!cli.command.pre_approved());
        assert_eq!(cli.attest_config().unwrap(), AttestConfig::default());
    }

    #[test]
    fn test_config_file_then_tag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ventus.toml");
        std::fs::write(&path, "key_tag = \"from.file\"\nverify_after_prove = false\n").unwrap();

        let cli = Cli::try_parse_from(["ventus", "--config", path.to_str().unwrap(), "reset-key"]).unwrap();
        let config = cli.attest_config().unwrap();
        assert_eq!(config.key_tag.as_str(), "from.file");
        assert!(!config.verify_after_prove);

        let cli = Cli::try_parse_from([
            "ventus",
            "--config",
            path.to_str().unwrap(),
            "--tag",
            "from.flag",
            "reset-key",
        ])
        .unwrap();
        assert_eq!(cli.attest_config().unwrap().key_tag.as_str(), "from.flag");
    }

    #[test]
    fn test_missing_image_is_a_usage_error() {
        assert!(Cli::try_parse_from(["ventus", "digest"]).is_err());
    }
}
