//! Snapshot persistence configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the directory the snapshot file lives in.
pub const DATA_DIR_ENV: &str = "DOCSTASH_DATA_DIR";

/// Default name of the snapshot file inside the data directory.
pub const DEFAULT_FILE_NAME: &str = "docstash.json";

/// Where the store keeps its snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Data directory path
    pub data_dir: PathBuf,

    /// Snapshot file name, relative to `data_dir`
    pub file_name: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

impl SnapshotConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads the data directory from `DOCSTASH_DATA_DIR`, falling back to the
    /// current directory when it is unset or empty.
    pub fn from_env() -> Self {
        match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}
