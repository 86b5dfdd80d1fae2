//! Application configuration constants
//!
//! Central location for on-disk names, cryptographic parameters,
//! retention limits and validation boundaries used throughout the crate.

use std::time::Duration;

// ===== Data Directory Layout =====

/// Default data directory name, created under the user's home directory
pub const DATA_DIR_NAME: &str = ".sealnotes";
/// Data directory name used by earlier installations; renamed on first start
pub const LEGACY_DATA_DIR_NAME: &str = ".notevault";
/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "SEALNOTES_DATA_DIR";

/// SQLite store file
pub const DB_FILE_NAME: &str = "sealnotes.db";
/// Store file name used by earlier installations
pub const LEGACY_DB_FILE_NAME: &str = "notevault.db";

pub const NOTES_DIR: &str = "notes";
pub const HISTORY_DIR: &str = "history";
/// Reserved for attachments; created but not written by this crate
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Recovery-key verifier file, independent of the metadata store
pub const VERIFIER_FILE_NAME: &str = "data_key_verifier";

/// Extension of every cipher file
pub const CIPHER_EXTENSION: &str = "enc";

// ===== Key Hierarchy =====

/// Argon2id time cost. Fixed once data exists: changing any KDF parameter
/// invalidates every stored verifier and wrapped data key.
pub const ARGON2_TIME_COST: u32 = 3;
/// Argon2id memory cost in KiB (64 MiB)
pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
/// Argon2id lanes
pub const ARGON2_PARALLELISM: u32 = 4;

pub const KEY_SIZE: usize = 32; // 256 bits
pub const SALT_SIZE: usize = 16; // 128 bits
pub const NONCE_SIZE: usize = 12; // 96 bits for GCM

/// Marker encrypted under the password key to check a password
pub const PASSWORD_VERIFIER_MARKER: &[u8] = b"SEALNOTES_VERIFY";
/// Marker encrypted under the data key into the verifier file
pub const DATA_KEY_VERIFIER_MARKER: &[u8] = b"SEALNOTES_DATAKEY_VERIFY_V1";

/// Symbols of a recovery key, which double as the raw data-key bytes
pub const RECOVERY_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Characters per hyphen-separated group in the display form
pub const RECOVERY_GROUP_LEN: usize = 8;

// ===== Note Store =====

/// Maximum number of characters kept in the cached preview
pub const PREVIEW_MAX_CHARS: usize = 200;

/// Minimum spacing between two history snapshots of the same note
pub const HISTORY_MIN_INTERVAL_MINUTES: i64 = 5;

/// Snapshots kept per note; older ones are pruned
pub const HISTORY_MAX_COUNT: usize = 20;

// ===== Session =====

/// Auto-lock interval stored in a fresh settings row
pub const DEFAULT_AUTO_LOCK_MINUTES: i64 = 5;

/// Upper bound for the auto-lock interval (one day). Zero disables auto-lock.
pub const MAX_AUTO_LOCK_MINUTES: i64 = 24 * 60;

/// Convert a stored auto-lock setting into a timer interval.
/// Zero or negative values disable auto-lock; values above the maximum
/// are clamped to it.
pub fn auto_lock_interval(minutes: i64) -> Option<Duration> {
    if minutes <= 0 {
        return None;
    }
    let minutes = minutes.min(MAX_AUTO_LOCK_MINUTES) as u64;
    Some(Duration::from_secs(minutes * 60))
}
