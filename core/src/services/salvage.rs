//! Skip-and-count collection for bulk operations
//!
//! Listing, history, import and migration keep going when a single item
//! fails to decrypt or parse. The failures are dropped but counted so the
//! caller can report how much was lost.

use crate::error::Result;

/// Items that succeeded plus the number that did not
#[derive(Debug)]
pub struct Salvaged<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Salvaged<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: 0,
        }
    }
}

impl<T> Salvaged<T> {
    /// Log the skip count under `what` if anything was dropped
    pub fn log_skipped(&self, what: &str) {
        if self.skipped > 0 {
            tracing::warn!("Skipped {} unreadable {}", self.skipped, what);
        }
    }
}

impl<T> FromIterator<Result<T>> for Salvaged<T> {
    fn from_iter<I: IntoIterator<Item = Result<T>>>(iter: I) -> Self {
        let mut salvaged = Salvaged::default();
        for item in iter {
            match item {
                Ok(value) => salvaged.items.push(value),
                Err(e) => {
                    tracing::debug!("Skipping item: {}", e);
                    salvaged.skipped += 1;
                }
            }
        }
        salvaged
    }
}
