//! Backup import and legacy layout migration
//!
//! Both are bulk operations over many cipher files: a note that cannot be
//! read or decrypted is skipped and counted, the rest go through.

use super::notes::{NoteContent, NotesService};
use super::salvage::Salvaged;
use super::session::Session;
use crate::config::NOTES_DIR;
use crate::crypto::{self, DataKey};
use crate::database::NoteMeta;
use crate::error::{AppError, Result};
use crate::storage::scan_cipher_files;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Outcome of [`NotesService::import_from_backup`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Outcome of [`NotesService::migrate_old_notes`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Notes moved to the sharded layout or given a list cache
    pub migrated: usize,
    pub skipped: usize,
}

impl NotesService {
    /// Import every note of a backup archive made by another installation.
    ///
    /// The notes are decrypted with that installation's recovery key and
    /// stored as new notes under the current data key.
    pub async fn import_from_backup(
        &self,
        session: &Session,
        archive: &Path,
        recovery_key: &str,
    ) -> Result<ImportReport> {
        let key = session.touch().await?;
        let import_key = crypto::parse_display_key(recovery_key)?;

        tracing::info!("Importing notes from backup: {:?}", archive);

        let scratch = ScratchDir::create().await?;
        extract_archive(archive, scratch.path()).await?;

        let notes_dir = scratch.path().join(NOTES_DIR);
        if !fs::try_exists(&notes_dir).await? {
            return Err(AppError::Import(
                "archive does not contain a notes directory".to_string(),
            ));
        }

        let mut results = Vec::new();
        for file in scan_cipher_files(&notes_dir).await? {
            results.push(self.import_file(&key, &import_key, &file).await);
        }

        let outcome: Salvaged<String> = results.into_iter().collect();
        outcome.log_skipped("backup notes");

        if outcome.items.is_empty() {
            return Err(AppError::Import(
                "no notes could be imported; check the recovery key".to_string(),
            ));
        }

        tracing::info!(
            "Imported {} notes ({} skipped)",
            outcome.items.len(),
            outcome.skipped
        );

        Ok(ImportReport {
            imported: outcome.items.len(),
            skipped: outcome.skipped,
        })
    }

    async fn import_file(&self, key: &DataKey, import_key: &DataKey, path: &Path) -> Result<String> {
        let body = NoteContent::decrypt(import_key, &fs::read(path).await?)?;
        let meta = self
            .insert_note(key, &Uuid::new_v4().to_string(), &body)
            .await?;
        Ok(meta.id)
    }

    /// Move notes written by older versions into the sharded layout and
    /// fill in missing list caches. Trashed notes are included. Running it
    /// again changes nothing.
    pub async fn migrate_old_notes(&self, session: &Session) -> Result<MigrationReport> {
        let key = session.touch().await?;

        let mut results = Vec::new();
        for meta in self.repo.list_notes(true).await? {
            let id = meta.id.clone();
            let result = self.migrate_note(&key, meta).await;
            if let Err(e) = &result {
                tracing::warn!("Could not migrate note {}: {}", id, e);
            }
            results.push(result);
        }

        let outcome: Salvaged<bool> = results.into_iter().collect();
        let report = MigrationReport {
            migrated: outcome.items.iter().filter(|changed| **changed).count(),
            skipped: outcome.skipped,
        };

        tracing::info!(
            "Note migration finished: {} migrated, {} skipped",
            report.migrated,
            report.skipped
        );
        Ok(report)
    }

    /// Returns whether the note needed any change
    async fn migrate_note(&self, key: &DataKey, mut meta: NoteMeta) -> Result<bool> {
        let relocate = !self.notes.is_sharded(&meta.id, &meta.cipher_path);
        let backfill = meta.encrypted_title.is_none() || meta.encrypted_preview.is_none();

        if !relocate && !backfill {
            return Ok(false);
        }

        let blob = self.notes.read(&meta.cipher_path).await?;

        if backfill {
            let (title, preview) = NoteContent::decrypt(key, &blob)?.encrypt_cache(key)?;
            meta.encrypted_title = Some(title);
            meta.encrypted_preview = Some(preview);
        }

        let mut legacy_path = None;
        if relocate {
            let sharded = self.notes.relative_path(&meta.id);
            self.notes.write(&sharded, &blob).await?;
            legacy_path = Some(std::mem::replace(&mut meta.cipher_path, sharded));
        }

        self.repo.update_note(&meta).await?;

        if let Some(old) = legacy_path {
            if let Err(e) = self.notes.delete(&old).await {
                tracing::warn!("Failed to remove legacy note file {}: {}", old, e);
            }
            tracing::debug!("Relocated note {} to {}", meta.id, meta.cipher_path);
        }

        Ok(true)
    }
}

/// Private extraction directory, removed when dropped
struct ScratchDir(PathBuf);

impl ScratchDir {
    async fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("sealnotes-import-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).await?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove scratch directory {:?}: {}", self.0, e);
            }
        }
    }
}

async fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest))
        .await
        .map_err(|e| AppError::Import(format!("Extraction task failed: {}", e)))?
}

/// Unpack a zip archive. Entries whose names would escape `dest` are skipped.
fn extract_archive_blocking(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping archive entry outside the extraction root");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}
