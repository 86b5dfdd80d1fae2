//! SealNotes library
//!
//! Offline encrypted note store: a password/recovery-key hierarchy, a
//! session that holds the data key while unlocked, and a note store that
//! keeps every note in its own encrypted file indexed by SQLite.

pub mod app;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;

pub use app::App;
pub use error::{AppError, Result};
