//! Storage module
//!
//! Sharded, atomically written cipher files for notes and history snapshots.

pub mod cipher_store;

pub use cipher_store::{scan_cipher_files, write_atomic, CipherStore};
