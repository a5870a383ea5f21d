//! Logging configuration
//!
//! Deserializable so it can sit in the same TOML file as the attestation
//! settings:
//!
//! ```toml
//! level = "info"
//!
//! [console]
//! format = "pretty"
//! level = "warn"
//!
//! [file]
//! directory = "/var/log/ventus"
//! rotation = "daily"
//!
//! [targets]
//! image = "off"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter level; `RUST_LOG` replaces it entirely when set
    pub level: String,
    pub console: ConsoleConfig,
    /// JSONL file output, off when absent
    pub file: Option<FileConfig>,
    pub json: JsonFormat,
    /// Per-target levels appended to the base level
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonFormat::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Debug level, colored human-readable console
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleConfig {
                format: ConsoleFormat::Pretty,
                ansi: true,
                ..ConsoleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Daily JSONL files under `log_dir`; only warnings reach the console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleConfig {
                level: Some("warn".to_string()),
                ..ConsoleConfig::default()
            },
            file: Some(FileConfig {
                directory: log_dir,
                max_files: Some(30),
                ..FileConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Warnings only, compact
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleConfig {
                format: ConsoleFormat::Compact,
                ..ConsoleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Set the level for one target, e.g. `ventus_attest` or `image`
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `EnvFilter` directive string for this config
    pub fn directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(self.targets.iter().map(|(target, level)| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Console output, always written to stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Colors; ignored for JSON
    pub ansi: bool,
    /// Stricter level for the console only
    pub level: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Json,
            ansi: false,
            level: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line, human-readable
    Pretty,
    /// Single-line, human-readable
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name prefix; rotated files are `<prefix>.<date>.jsonl`
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files kept before the oldest is removed
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            prefix: "ventus".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.log`, truncated at startup
    Never,
}

/// Shape of JSON log lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFormat {
    /// Put event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    pub span_list: bool,
    pub current_span: bool,
    pub thread_info: bool,
    /// Source file and line
    pub location: bool,
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self {
            flatten_events: true,
            span_list: true,
            current_span: true,
            thread_info: false,
            location: true,
        }
    }
}
