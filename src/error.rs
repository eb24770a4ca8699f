//! Error types for the ingestion and storage engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Input that claims to be a known format but lacks required fields
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store schema version {found} is newer than supported version {supported}")]
    IncompatibleSchema { found: u32, supported: u32 },
}

impl ArchiveError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(conversation_id: impl Into<String>) -> Self {
        Self::NotFound(conversation_id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
