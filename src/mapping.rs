// src/mapping.rs

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_DIR: &str = "./punchboard_config";
pub const DEFAULT_NAMESPACE: &str = "attendance";

/// Static mapping from the logical attendance fields to opaque column ids
/// on the remote board, plus the board id itself. Loaded once at session
/// start and immutable thereafter; absence means "not configured", a valid
/// state every caller must handle without touching the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub board_id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub date: String,
    pub login_time: String,
    pub logout_time: String,
    pub entry_type: String,
    pub location: String,
    pub logout_location: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Config blob is not valid JSON")]
    Json(#[from] serde_json::Error),
}

fn io_context<E: Into<std::io::Error>, S: Into<String>>(source: E, context: S) -> ConfigError {
    ConfigError::Io {
        source: source.into(),
        context: context.into(),
    }
}

/// File-backed store for the mapping blob: one JSON file per application
/// namespace under a config directory.
#[derive(Debug, Clone)]
pub struct MappingStore {
    dir: PathBuf,
    namespace: String,
}

impl MappingStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, namespace: S) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    pub fn blob_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.namespace))
    }

    /// Missing file is `None`, not an error. A present-but-corrupt blob is
    /// surfaced so the operator can fix or re-run configuration.
    pub fn load(&self) -> Result<Option<ColumnMapping>, ConfigError> {
        let path = self.blob_path();
        if !path.exists() {
            debug!("No mapping blob at {:?}", path);
            return Ok(None);
        }

        let json_string = read_blob(&path)?;
        let mapping: ColumnMapping = serde_json::from_str(&json_string)?;
        Ok(Some(mapping))
    }

    pub fn save(&self, mapping: &ColumnMapping) -> Result<(), ConfigError> {
        let path = self.blob_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                io_context(e, format!("Failed to create config directory: {:?}", parent))
            })?;
        }

        let json_string = serde_json::to_string_pretty(mapping)?;
        let mut file = File::create(&path)
            .map_err(|e| io_context(e, format!("Failed to create config file: {:?}", path)))?;
        file.write_all(json_string.as_bytes())
            .map_err(|e| io_context(e, format!("Failed to write config file: {:?}", path)))?;

        debug!("Saved mapping blob to {:?}", path);
        Ok(())
    }
}

fn read_blob(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map_err(|e| io_context(e, format!("Failed to read config file: {:?}", path)))
}
