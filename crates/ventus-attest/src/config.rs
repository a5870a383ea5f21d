//! Configuration for attestation runs.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Values can also be set with the `with_*` builder methods.
//!
//! ```toml
//! key_tag = "com.ventus.securekey"
//! circuit_manifest = "circuits/noircircuits.json"
//! srs_path = "circuits/srs.local"
//! verify_after_prove = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ventus_core::{
    AttestError, AttestResult, DigestAlgorithm, KeyPolicy, KeyTag, MediaEncoding,
    SignatureAlgorithm,
};

/// Prompt text shown when authorizing a signature
pub const DEFAULT_AUTH_REASON: &str = "Sign data";

/// Circuit manifest looked up when none is configured
pub const DEFAULT_CIRCUIT_MANIFEST: &str = "noircircuits.json";

/// Configuration for the attestation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    /// Tag under which the signing key is stored.
    pub key_tag: KeyTag,
    /// Reason shown in the biometric prompt.
    pub auth_reason: String,
    /// Circuit manifest handed to the proving backend.
    pub circuit_manifest: PathBuf,
    /// Local structured reference string, if the backend needs one.
    pub srs_path: Option<PathBuf>,
    /// How media is canonicalized before hashing.
    pub media_encoding: MediaEncoding,
    /// Hash applied to the canonical media.
    pub digest_algorithm: DigestAlgorithm,
    /// Signature scheme requested from the key store.
    pub signature_algorithm: SignatureAlgorithm,
    /// Verify each proof right after producing it.
    pub verify_after_prove: bool,
    /// Generate keys that require user presence for every use.
    pub require_biometry: bool,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            key_tag: KeyTag::default(),
            auth_reason: DEFAULT_AUTH_REASON.to_string(),
            circuit_manifest: PathBuf::from(DEFAULT_CIRCUIT_MANIFEST),
            srs_path: None,
            media_encoding: MediaEncoding::default(),
            digest_algorithm: DigestAlgorithm::default(),
            signature_algorithm: SignatureAlgorithm::default(),
            verify_after_prove: true,
            require_biometry: true,
        }
    }
}

impl AttestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> AttestResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AttestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> AttestResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AttestError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Serialize to a TOML document.
    pub fn to_toml_string(&self) -> AttestResult<String> {
        toml::to_string_pretty(self).map_err(|e| AttestError::Config(e.to_string()))
    }

    /// Check that the configured values can work together.
    pub fn validate(&self) -> AttestResult<()> {
        if self.key_tag.as_str().trim().is_empty() {
            return Err(AttestError::Config("key tag must not be empty".to_string()));
        }
        if self.auth_reason.trim().is_empty() {
            return Err(AttestError::Config("auth reason must not be empty".to_string()));
        }
        if self.circuit_manifest.as_os_str().is_empty() {
            return Err(AttestError::Config("circuit manifest path must not be empty".to_string()));
        }
        if self.signature_algorithm.digest_algorithm() != self.digest_algorithm {
            return Err(AttestError::Config(format!(
                "signature algorithm {:?} does not sign {:?} digests",
                self.signature_algorithm, self.digest_algorithm
            )));
        }
        Ok(())
    }

    /// Policy applied when the signing key is first generated.
    pub fn key_policy(&self) -> KeyPolicy {
        KeyPolicy {
            hardware_only: true,
            require_user_presence: self.require_biometry,
        }
    }

    pub fn with_key_tag(mut self, tag: KeyTag) -> Self {
        self.key_tag = tag;
        self
    }

    pub fn with_auth_reason(mut self, reason: impl Into<String>) -> Self {
        self.auth_reason = reason.into();
        self
    }

    pub fn with_circuit_manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.circuit_manifest = manifest.into();
        self
    }

    pub fn with_srs_path(mut self, srs: impl Into<PathBuf>) -> Self {
        self.srs_path = Some(srs.into());
        self
    }

    pub fn with_media_encoding(mut self, encoding: MediaEncoding) -> Self {
        self.media_encoding = encoding;
        self
    }

    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    pub fn with_verify_after_prove(mut self, verify: bool) -> Self {
        self.verify_after_prove = verify;
        self
    }

    pub fn with_require_biometry(mut self, require: bool) -> Self {
        self.require_biometry = require;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AttestConfig::default();
        assert_eq!(config.key_tag.as_str(), "com.ventus.securekey");
        assert_eq!(config.auth_reason, "Sign data");
        assert_eq!(config.circuit_manifest, PathBuf::from("noircircuits.json"));
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::EcdsaP256Sha256Digest);
        assert!(config.srs_path.is_none());
        assert!(config.verify_after_prove);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AttestConfig::from_toml_str(
            r#"
key_tag = "org.example.camera"
srs_path = "/var/lib/ventus/srs.local"
media_encoding = "verbatim"
signature_algorithm = "ecdsa_p256_sha256_message"
verify_after_prove = false
"#,
        )
        .unwrap();

        assert_eq!(config.key_tag.as_str(), "org.example.camera");
        assert_eq!(config.srs_path, Some(PathBuf::from("/var/lib/ventus/srs.local")));
        assert_eq!(config.media_encoding, MediaEncoding::Verbatim);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::EcdsaP256Sha256Message);
        assert!(!config.verify_after_prove);
        assert_eq!(config.auth_reason, DEFAULT_AUTH_REASON);
    }

    #[test]
    fn test_rejects_unknown_algorithm_and_empty_tag() {
        let err = AttestConfig::from_toml_str(r#"signature_algorithm = "rsa_pss""#).unwrap_err();
        assert!(matches!(err, AttestError::Config(_)));

        let err = AttestConfig::from_toml_str(r#"key_tag = "  ""#).unwrap_err();
        assert!(matches!(err, AttestError::Config(_)));

        let err = AttestConfig::from_toml_str(r#"auth_reason = """#).unwrap_err();
        assert!(matches!(err, AttestError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ventus.toml");
        let config = AttestConfig::default()
            .with_circuit_manifest("circuits/attest.json")
            .with_srs_path("circuits/srs.local")
            .with_require_biometry(false);

        fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        let loaded = AttestConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.key_policy().require_user_presence);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AttestConfig::from_toml_file("/nonexistent/ventus.toml").unwrap_err();
        assert!(matches!(err, AttestError::Config(_)));
    }
}
