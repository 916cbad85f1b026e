use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scan error at {}: {reason}", path.display())]
    Scan { path: PathBuf, reason: String },

    #[error("Parse error in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Manifest IO error at {}: {reason}", path.display())]
    ManifestIo { path: PathBuf, reason: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl DiscoveryError {
    pub fn scan(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Scan {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn manifest_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ManifestIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
