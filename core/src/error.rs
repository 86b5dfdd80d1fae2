//! Error types for SealNotes
//!
//! All errors use thiserror for structured error handling.
//! Decryption failures are deliberately collapsed into a single
//! `Authentication` variant so callers cannot tell a wrong key from
//! tampered data.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Session is locked")]
    NotUnlocked,

    #[error("Authentication failed: wrong key or corrupted data")]
    Authentication,

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("History entry not found: {0}")]
    HistoryNotFound(String),

    #[error("Invalid recovery key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Data key verification file is missing")]
    VerifierMissing,

    #[error("Master password has not been set up")]
    NotInitialized,

    #[error("Master password is already set up")]
    AlreadyInitialized,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
