//! Database models
//!
//! Rust structs representing rows of the metadata index. Note content is
//! never stored here; only paths to cipher files and encrypted caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The singleton master password record
#[derive(Debug, Clone, FromRow)]
pub struct MasterPasswordRecord {
    pub salt: Vec<u8>,
    /// Password-verifier marker encrypted under the password key
    pub verifier: Vec<u8>,
    pub hint: String,
    /// Data key wrapped under the password key
    pub encrypted_data_key: Vec<u8>,
}

/// Metadata row of a note
#[derive(Debug, Clone, FromRow)]
pub struct NoteMeta {
    pub id: String,
    /// Cipher file path relative to the data directory
    pub cipher_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    /// Tombstone set by soft delete
    pub deleted_at: Option<DateTime<Utc>>,
    pub notebook_id: Option<String>,
    pub sort_order: i64,
    /// Title encrypted under the data key, absent for legacy notes
    pub encrypted_title: Option<Vec<u8>>,
    /// Preview encrypted under the data key, absent for legacy notes
    pub encrypted_preview: Option<Vec<u8>>,
}

/// History snapshot of a note
#[derive(Debug, Clone, FromRow)]
pub struct NoteHistory {
    pub id: String,
    pub note_id: String,
    pub cipher_path: String,
    pub created_at: DateTime<Utc>,
}

/// Tag attached to notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// Notebook grouping notes
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notebook {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub sort_order: i64,
    pub pinned: bool,
}

/// Settings singleton
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Settings {
    /// Minutes of inactivity before the session locks; 0 disables
    pub auto_lock_minutes: i64,
    pub lock_on_minimize: bool,
    pub lock_on_sleep: bool,
}
