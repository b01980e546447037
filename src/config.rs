// Annotator configuration (JSON file)
//
// {
//   "registry_path": "registry.db",
//   "lookup_timeout_ms": 2000,
//   "wal": true
// }

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// SQLite registry database
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Deadline for the registry lookup (None = no deadline)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_timeout_ms: Option<u64>,

    /// Put the registry database in WAL mode
    #[serde(default = "default_wal")]
    pub wal: bool,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("registry.db")
}

fn default_wal() -> bool {
    true
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        AnnotatorConfig {
            registry_path: default_registry_path(),
            lookup_timeout_ms: None,
            wal: default_wal(),
        }
    }
}

impl AnnotatorConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AnnotatorConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Config file if it exists, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => AnnotatorConfig::from_file(path),
            None => Ok(AnnotatorConfig::default()),
        }
    }

    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout_ms.map(Duration::from_millis)
    }
}
