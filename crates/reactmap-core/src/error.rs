//! Error types for reactmap.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReactmapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No reactions found in database")]
    NoReactions,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ReactmapError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        ReactmapError::InvalidConfig(msg.into())
    }

    /// True for errors raised before any computation because of bad input settings.
    pub fn is_config_error(&self) -> bool {
        matches!(self, ReactmapError::InvalidConfig(_))
    }
}
