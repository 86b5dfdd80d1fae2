//! Notes service
//!
//! Encrypted note lifecycle: create, read, update with history snapshots,
//! soft and hard delete, listing.
//!
//! Each note body is a JSON `{title, content}` document encrypted under the
//! session's data key into its own cipher file. The row keeps a separately
//! encrypted title and preview so listings don't have to open every file.
//!
//! Writes put the file in place before the row that references it;
//! deletes remove rows before files. A crash can leave an orphaned cipher
//! file but never a row pointing at nothing.

use crate::config::{
    HISTORY_DIR, HISTORY_MAX_COUNT, HISTORY_MIN_INTERVAL_MINUTES, NOTES_DIR, PREVIEW_MAX_CHARS,
};
use crate::crypto::{self, DataKey};
use crate::database::{NoteHistory, NoteMeta, Repository, Tag};
use crate::error::{AppError, Result};
use crate::services::salvage::Salvaged;
use crate::services::session::Session;
use crate::storage::CipherStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Plaintext body of a note, serialized to JSON before encryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    pub title: String,
    pub content: String,
}

impl NoteContent {
    pub(super) fn encrypt(&self, key: &DataKey) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(serde_json::to_vec(self)?);
        crypto::encrypt(key.as_bytes(), &plaintext)
    }

    pub(super) fn decrypt(key: &DataKey, blob: &[u8]) -> Result<Self> {
        let plaintext = crypto::decrypt(key.as_bytes(), blob)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Encrypted `(title, preview)` pair for the list cache
    pub(super) fn encrypt_cache(&self, key: &DataKey) -> Result<(Vec<u8>, Vec<u8>)> {
        let title = crypto::encrypt(key.as_bytes(), self.title.as_bytes())?;
        let preview = crypto::encrypt(key.as_bytes(), preview(&self.content).as_bytes())?;
        Ok((title, preview))
    }
}

/// First characters of the content, never splitting a character
pub fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// A fully decrypted note
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub notebook_id: Option<String>,
    pub tags: Vec<Tag>,
}

impl Note {
    fn from_parts(meta: NoteMeta, body: NoteContent, tags: Vec<Tag>) -> Self {
        Self {
            id: meta.id,
            title: body.title,
            content: body.content,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            pinned: meta.pinned,
            deleted_at: meta.deleted_at,
            notebook_id: meta.notebook_id,
            tags,
        }
    }
}

/// List entry: title and truncated preview instead of the full body
#[derive(Debug, Clone, Serialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub notebook_id: Option<String>,
    pub tags: Vec<Tag>,
}

/// One page of the note list
#[derive(Debug, Clone, Serialize)]
pub struct NotePage {
    pub notes: Vec<NoteSummary>,
    /// Visible notes in the whole store
    pub total: i64,
    /// Notes on this page that could not be decrypted
    pub skipped: usize,
}

/// A decrypted history snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Service for managing encrypted notes
#[derive(Clone)]
pub struct NotesService {
    pub(super) repo: Repository,
    pub(super) notes: CipherStore,
    pub(super) history: CipherStore,
}

impl NotesService {
    pub fn new(repo: Repository, data_dir: &Path) -> Self {
        Self {
            repo,
            notes: CipherStore::new(data_dir.to_path_buf(), NOTES_DIR),
            history: CipherStore::new(data_dir.to_path_buf(), HISTORY_DIR),
        }
    }

    /// Create the cipher directories
    pub async fn initialize(&self) -> Result<()> {
        self.notes.initialize().await?;
        self.history.initialize().await
    }

    /// Create a new note
    pub async fn create(&self, session: &Session, title: &str, content: &str) -> Result<Note> {
        let key = session.touch().await?;

        let body = NoteContent {
            title: title.to_string(),
            content: content.to_string(),
        };
        let meta = self.insert_note(&key, &Uuid::new_v4().to_string(), &body).await?;

        tracing::info!("Note created: {}", meta.id);
        Ok(Note::from_parts(meta, body, Vec::new()))
    }

    /// Encrypt `body` into a new sharded file and insert its row.
    /// The file is removed again if the row cannot be written.
    pub(super) async fn insert_note(
        &self,
        key: &DataKey,
        id: &str,
        body: &NoteContent,
    ) -> Result<NoteMeta> {
        let blob = body.encrypt(key)?;
        let (encrypted_title, encrypted_preview) = body.encrypt_cache(key)?;

        let cipher_path = self.notes.relative_path(id);
        self.notes.write(&cipher_path, &blob).await?;

        let now = Utc::now();
        let meta = NoteMeta {
            id: id.to_string(),
            cipher_path,
            created_at: now,
            updated_at: now,
            pinned: false,
            deleted_at: None,
            notebook_id: None,
            sort_order: 0,
            encrypted_title: Some(encrypted_title),
            encrypted_preview: Some(encrypted_preview),
        };

        if let Err(e) = self.repo.create_note(&meta).await {
            if let Err(cleanup) = self.notes.delete(&meta.cipher_path).await {
                tracing::warn!("Failed to remove orphaned note file {}: {}", meta.cipher_path, cleanup);
            }
            return Err(e);
        }

        Ok(meta)
    }

    /// Get a note with its full decrypted body
    pub async fn get(&self, session: &Session, id: &str) -> Result<Note> {
        let key = session.touch().await?;

        let meta = self.repo.get_note(id).await?;
        let body = NoteContent::decrypt(&key, &self.notes.read(&meta.cipher_path).await?)?;
        let tags = self.repo.get_note_tags(id).await?;

        Ok(Note::from_parts(meta, body, tags))
    }

    /// Replace a note's title and content.
    ///
    /// When the content actually changed and the newest snapshot is at least
    /// five minutes old, the previous ciphertext is kept as a history entry.
    pub async fn update(
        &self,
        session: &Session,
        id: &str,
        title: &str,
        content: &str,
    ) -> Result<Note> {
        let key = session.touch().await?;
        let mut meta = self.repo.get_note(id).await?;

        let body = NoteContent {
            title: title.to_string(),
            content: content.to_string(),
        };

        let snapshot = self.snapshot_if_due(&key, &meta, &body).await?;

        let blob = body.encrypt(&key)?;
        let (encrypted_title, encrypted_preview) = body.encrypt_cache(&key)?;
        self.notes.write(&meta.cipher_path, &blob).await?;

        meta.updated_at = Utc::now();
        meta.encrypted_title = Some(encrypted_title);
        meta.encrypted_preview = Some(encrypted_preview);

        if let Err(e) = self
            .repo
            .update_note_with_history(&meta, snapshot.as_ref())
            .await
        {
            if let Some(h) = &snapshot {
                if let Err(cleanup) = self.history.delete(&h.cipher_path).await {
                    tracing::warn!("Failed to remove orphaned snapshot {}: {}", h.cipher_path, cleanup);
                }
            }
            return Err(e);
        }

        if snapshot.is_some() {
            if let Err(e) = self.prune_history(id).await {
                tracing::warn!("Failed to prune history of note {}: {}", id, e);
            }
        }

        tracing::debug!("Note updated: {}", id);

        let tags = self.repo.get_note_tags(id).await?;
        Ok(Note::from_parts(meta, body, tags))
    }

    /// Copy the current ciphertext into the history namespace if a snapshot is due.
    /// An unreadable current version is never snapshotted.
    async fn snapshot_if_due(
        &self,
        key: &DataKey,
        meta: &NoteMeta,
        body: &NoteContent,
    ) -> Result<Option<NoteHistory>> {
        let old_blob = match self.notes.read(&meta.cipher_path).await {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("Previous version of note {} unreadable: {}", meta.id, e);
                return Ok(None);
            }
        };

        match NoteContent::decrypt(key, &old_blob) {
            Ok(old) if old != *body => {}
            Ok(_) => return Ok(None),
            Err(e) => {
                tracing::warn!("Previous version of note {} undecryptable: {}", meta.id, e);
                return Ok(None);
            }
        }

        if let Some(latest) = self.repo.latest_history(&meta.id).await? {
            if Utc::now() - latest.created_at < Duration::minutes(HISTORY_MIN_INTERVAL_MINUTES) {
                return Ok(None);
            }
        }

        let history_id = Uuid::new_v4().to_string();
        let cipher_path = self.history.relative_path(&history_id);
        self.history.write(&cipher_path, &old_blob).await?;

        Ok(Some(NoteHistory {
            id: history_id,
            note_id: meta.id.clone(),
            cipher_path,
            created_at: Utc::now(),
        }))
    }

    /// Drop the oldest snapshots beyond the retention cap, row first then file
    async fn prune_history(&self, note_id: &str) -> Result<()> {
        let entries = self.repo.list_history(note_id).await?;

        for entry in entries.iter().skip(HISTORY_MAX_COUNT).rev() {
            self.repo.delete_history(&entry.id).await?;
            if let Err(e) = self.history.delete(&entry.cipher_path).await {
                tracing::warn!("Failed to remove snapshot file {}: {}", entry.cipher_path, e);
            }
            tracing::debug!("Pruned snapshot {} of note {}", entry.id, note_id);
        }

        Ok(())
    }

    pub async fn set_pinned(&self, session: &Session, id: &str, pinned: bool) -> Result<()> {
        session.touch().await?;

        let mut meta = self.repo.get_note(id).await?;
        meta.pinned = pinned;
        meta.updated_at = Utc::now();
        self.repo.update_note(&meta).await
    }

    /// Move a note to the trash
    pub async fn soft_delete(&self, session: &Session, id: &str) -> Result<()> {
        session.touch().await?;

        let mut meta = self.repo.get_note(id).await?;
        meta.deleted_at = Some(Utc::now());
        self.repo.update_note(&meta).await?;

        tracing::info!("Note moved to trash: {}", id);
        Ok(())
    }

    /// Take a note out of the trash
    pub async fn restore(&self, session: &Session, id: &str) -> Result<()> {
        session.touch().await?;

        let mut meta = self.repo.get_note(id).await?;
        meta.deleted_at = None;
        meta.updated_at = Utc::now();
        self.repo.update_note(&meta).await?;

        tracing::info!("Note restored: {}", id);
        Ok(())
    }

    /// Permanently delete a note and all of its snapshots
    pub async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        session.touch().await?;

        let meta = self.repo.get_note(id).await?;
        let history = self.repo.list_history(id).await?;

        self.repo.delete_note_permanently(id).await?;

        let files = std::iter::once(&meta.cipher_path).chain(history.iter().map(|h| &h.cipher_path));
        for path in files {
            if let Err(e) = self.notes.delete(path).await {
                tracing::warn!("Failed to remove cipher file {}: {}", path, e);
            }
        }

        tracing::info!("Note deleted permanently: {} ({} snapshots)", id, history.len());
        Ok(())
    }

    /// Visible notes in display order
    pub async fn list(&self, session: &Session) -> Result<Vec<NoteSummary>> {
        let key = session.touch().await?;

        let metas = self.repo.list_notes(false).await?;
        let summaries = self.summarize(&key, metas).await?;
        summaries.log_skipped("notes");

        Ok(summaries.items)
    }

    /// Notes in the trash, most recently deleted first
    pub async fn list_deleted(&self, session: &Session) -> Result<Vec<NoteSummary>> {
        let key = session.touch().await?;

        let metas = self.repo.list_deleted_notes().await?;
        let summaries = self.summarize(&key, metas).await?;
        summaries.log_skipped("deleted notes");

        Ok(summaries.items)
    }

    pub async fn list_paginated(
        &self,
        session: &Session,
        limit: i64,
        offset: i64,
    ) -> Result<NotePage> {
        let key = session.touch().await?;

        let (metas, total) = self.repo.list_notes_paginated(limit, offset).await?;
        let summaries = self.summarize(&key, metas).await?;

        Ok(NotePage {
            notes: summaries.items,
            total,
            skipped: summaries.skipped,
        })
    }

    async fn summarize(&self, key: &DataKey, metas: Vec<NoteMeta>) -> Result<Salvaged<NoteSummary>> {
        let ids: Vec<String> = metas.iter().map(|m| m.id.clone()).collect();
        let mut tags = self.repo.get_note_tags_batch(&ids).await?;

        let mut results = Vec::with_capacity(metas.len());
        for meta in metas {
            let result = self
                .title_and_preview(key, &meta)
                .await
                .map(|(title, preview)| NoteSummary {
                    tags: tags.remove(&meta.id).unwrap_or_default(),
                    id: meta.id,
                    title,
                    preview,
                    created_at: meta.created_at,
                    updated_at: meta.updated_at,
                    pinned: meta.pinned,
                    deleted_at: meta.deleted_at,
                    notebook_id: meta.notebook_id,
                });
            results.push(result);
        }

        Ok(results.into_iter().collect())
    }

    /// Cached title/preview when available, otherwise the full body truncated
    async fn title_and_preview(&self, key: &DataKey, meta: &NoteMeta) -> Result<(String, String)> {
        let cached_title = meta
            .encrypted_title
            .as_deref()
            .and_then(|blob| decrypt_string(key, blob).ok());

        if let Some(title) = cached_title {
            let preview = meta
                .encrypted_preview
                .as_deref()
                .and_then(|blob| decrypt_string(key, blob).ok())
                .unwrap_or_default();
            return Ok((title, preview));
        }

        let body = NoteContent::decrypt(key, &self.notes.read(&meta.cipher_path).await?)?;
        Ok((body.title, preview(&body.content)))
    }

    /// Assign a note to a notebook, or clear it with `None`
    pub async fn set_notebook(
        &self,
        session: &Session,
        id: &str,
        notebook_id: Option<&str>,
    ) -> Result<()> {
        session.touch().await?;
        self.repo.set_note_notebook(id, notebook_id).await
    }

    /// Assign several notes to a notebook at once. Nothing changes if any
    /// id is unknown.
    pub async fn set_notebook_many(
        &self,
        session: &Session,
        ids: &[String],
        notebook_id: Option<&str>,
    ) -> Result<()> {
        session.touch().await?;
        self.repo.set_notes_notebook(ids, notebook_id).await
    }

    /// Move several notes to the trash in one step
    pub async fn soft_delete_many(&self, session: &Session, ids: &[String]) -> Result<()> {
        session.touch().await?;
        self.repo.soft_delete_notes(ids, Utc::now()).await?;

        tracing::info!("Moved {} notes to trash", ids.len());
        Ok(())
    }

    /// Persist a manual ordering: each note's sort order becomes its index
    pub async fn reorder(&self, session: &Session, ids: &[String]) -> Result<()> {
        session.touch().await?;
        self.repo.reorder_notes(ids).await
    }

    /// Snapshots of a note, newest first. Unreadable snapshots are skipped.
    pub async fn get_history(&self, session: &Session, note_id: &str) -> Result<Vec<HistoryEntry>> {
        let key = session.touch().await?;

        let mut results = Vec::new();
        for h in self.repo.list_history(note_id).await? {
            let entry = self.read_snapshot(&key, &h).await.map(|body| HistoryEntry {
                id: h.id,
                note_id: h.note_id,
                title: body.title,
                content: body.content,
                created_at: h.created_at,
            });
            results.push(entry);
        }

        let entries: Salvaged<HistoryEntry> = results.into_iter().collect();
        entries.log_skipped("history snapshots");
        Ok(entries.items)
    }

    /// Make a snapshot the current version. This is an ordinary update, so
    /// the version being replaced may itself become a snapshot.
    pub async fn restore_from_history(
        &self,
        session: &Session,
        note_id: &str,
        history_id: &str,
    ) -> Result<Note> {
        let key = session.touch().await?;

        let entry = self.repo.get_history_entry(note_id, history_id).await?;
        let body = self.read_snapshot(&key, &entry).await?;

        tracing::info!("Restoring note {} from snapshot {}", note_id, history_id);
        self.update(session, note_id, &body.title, &body.content).await
    }

    async fn read_snapshot(&self, key: &DataKey, entry: &NoteHistory) -> Result<NoteContent> {
        NoteContent::decrypt(key, &self.history.read(&entry.cipher_path).await?)
    }
}

fn decrypt_string(key: &DataKey, blob: &[u8]) -> Result<String> {
    let plaintext = crypto::decrypt(key.as_bytes(), blob)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| AppError::Crypto("Cached field is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn create_test_service() -> (NotesService, Session, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();

        let repo = Repository::new(pool);
        let session = Session::new(repo.clone(), temp_dir.path());
        session.setup("hunter2", "pet", None).await.unwrap();

        let service = NotesService::new(repo, temp_dir.path());
        service.initialize().await.unwrap();

        (service, session, temp_dir)
    }

    /// Shift every snapshot of a note further into the past
    async fn backdate_history(service: &NotesService, note_id: &str) {
        for h in service.repo.list_history(note_id).await.unwrap() {
            sqlx::query("UPDATE note_history SET created_at = ? WHERE id = ?")
                .bind(h.created_at - Duration::minutes(HISTORY_MIN_INTERVAL_MINUTES + 1))
                .bind(&h.id)
                .execute(service.repo.pool())
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("short"), "short");

        let long: String = "é".repeat(PREVIEW_MAX_CHARS + 50);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_MAX_CHARS);
        assert!(long.starts_with(&p));
    }

    #[tokio::test]
    async fn test_create_requires_unlocked_session() {
        let (service, session, _temp) = create_test_service().await;

        session.lock().await;
        let result = service.create(&session, "Title", "Body").await;
        assert!(matches!(result, Err(AppError::NotUnlocked)));

        let listing = service.list(&session).await;
        assert!(matches!(listing, Err(AppError::NotUnlocked)));
    }

    #[tokio::test]
    async fn test_create_and_get_note() {
        let (service, session, temp) = create_test_service().await;

        let note = service.create(&session, "Groceries", "milk, eggs").await.unwrap();

        let fetched = service.get(&session, &note.id).await.unwrap();
        assert_eq!(fetched.title, "Groceries");
        assert_eq!(fetched.content, "milk, eggs");
        assert!(fetched.tags.is_empty());

        let path = temp
            .path()
            .join("notes")
            .join(&note.id[..2])
            .join(format!("{}.enc", note.id));
        let on_disk = std::fs::read(path).unwrap();
        assert!(!on_disk.windows(9).any(|w| w == b"Groceries"));
    }

    #[tokio::test]
    async fn test_get_missing_note() {
        let (service, session, _temp) = create_test_service().await;

        let result = service.get(&session, "missing").await;
        assert!(matches!(result, Err(AppError::NoteNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_changes_content() {
        let (service, session, _temp) = create_test_service().await;

        let note = service.create(&session, "Draft", "v1").await.unwrap();
        let updated = service.update(&session, &note.id, "Final", "v2").await.unwrap();
        assert_eq!(updated.title, "Final");
        assert!(updated.updated_at >= note.updated_at);

        let fetched = service.get(&session, &note.id).await.unwrap();
        assert_eq!(fetched.content, "v2");

        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed[0].title, "Final");
        assert_eq!(listed[0].preview, "v2");
    }

    #[tokio::test]
    async fn test_history_respects_interval() {
        let (service, session, _temp) = create_test_service().await;

        let note = service.create(&session, "Note", "v0").await.unwrap();
        service.update(&session, &note.id, "Note", "v1").await.unwrap();
        service.update(&session, &note.id, "Note", "v2").await.unwrap();

        let history = service.get_history(&session, &note.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "v0");

        backdate_history(&service, &note.id).await;
        service.update(&session, &note.id, "Note", "v3").await.unwrap();

        let history = service.get_history(&session, &note.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "v2");
        assert_eq!(history[1].content, "v0");
    }

    #[tokio::test]
    async fn test_unchanged_update_takes_no_snapshot() {
        let (service, session, _temp) = create_test_service().await;

        let note = service.create(&session, "Same", "text").await.unwrap();
        service.update(&session, &note.id, "Same", "text").await.unwrap();

        assert!(service.get_history(&session, &note.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let (service, session, temp) = create_test_service().await;

        let note = service.create(&session, "Note", "v0").await.unwrap();
        for i in 1..=(HISTORY_MAX_COUNT + 1) {
            service
                .update(&session, &note.id, "Note", &format!("v{}", i))
                .await
                .unwrap();
            backdate_history(&service, &note.id).await;
        }

        let history = service.get_history(&session, &note.id).await.unwrap();
        assert_eq!(history.len(), HISTORY_MAX_COUNT);
        assert_eq!(history[0].content, format!("v{}", HISTORY_MAX_COUNT));
        assert_eq!(history.last().unwrap().content, "v1");

        let files = crate::storage::scan_cipher_files(&temp.path().join("history"))
            .await
            .unwrap();
        assert_eq!(files.len(), HISTORY_MAX_COUNT);
    }

    #[tokio::test]
    async fn test_restore_from_history() {
        let (service, session, _temp) = create_test_service().await;

        let note = service.create(&session, "Poem", "first draft").await.unwrap();
        service.update(&session, &note.id, "Poem", "second draft").await.unwrap();

        let history = service.get_history(&session, &note.id).await.unwrap();
        let restored = service
            .restore_from_history(&session, &note.id, &history[0].id)
            .await
            .unwrap();
        assert_eq!(restored.content, "first draft");

        let missing = service.restore_from_history(&session, &note.id, "nope").await;
        assert!(matches!(missing, Err(AppError::HistoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let (service, session, _temp) = create_test_service().await;

        let keep = service.create(&session, "Keep", "a").await.unwrap();
        let trash = service.create(&session, "Trash", "b").await.unwrap();

        service.soft_delete(&session, &trash.id).await.unwrap();

        let visible: Vec<String> = service
            .list(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(visible, vec![keep.id.clone()]);

        let deleted = service.list_deleted(&session).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, trash.id);
        assert!(deleted[0].deleted_at.is_some());

        service.restore(&session, &trash.id).await.unwrap();

        assert_eq!(service.list(&session).await.unwrap().len(), 2);
        assert!(service.list_deleted(&session).await.unwrap().is_empty());
        let restored = service.get(&session, &trash.id).await.unwrap();
        assert_eq!(restored.content, "b");
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_hard_delete_removes_files() {
        let (service, session, temp) = create_test_service().await;

        let note = service.create(&session, "Gone", "v0").await.unwrap();
        service.update(&session, &note.id, "Gone", "v1").await.unwrap();

        service.delete(&session, &note.id).await.unwrap();

        assert!(matches!(
            service.get(&session, &note.id).await,
            Err(AppError::NoteNotFound(_))
        ));
        for dir in ["notes", "history"] {
            let files = crate::storage::scan_cipher_files(&temp.path().join(dir))
                .await
                .unwrap();
            assert!(files.is_empty(), "{} still has files", dir);
        }
    }

    #[tokio::test]
    async fn test_pinned_notes_listed_first() {
        let (service, session, _temp) = create_test_service().await;

        let first = service.create(&session, "First", "").await.unwrap();
        let second = service.create(&session, "Second", "").await.unwrap();

        service.set_pinned(&session, &first.id, true).await.unwrap();
        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert!(listed[0].pinned);

        service.set_pinned(&session, &first.id, false).await.unwrap();
        service.reorder(&session, &[second.id.clone(), first.id.clone()]).await.unwrap();
        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_list_falls_back_to_body_without_cache() {
        let (service, session, _temp) = create_test_service().await;

        let long_body = "x".repeat(PREVIEW_MAX_CHARS * 2);
        let note = service.create(&session, "Legacy", &long_body).await.unwrap();

        let mut meta = service.repo.get_note(&note.id).await.unwrap();
        meta.encrypted_title = None;
        meta.encrypted_preview = None;
        service.repo.update_note(&meta).await.unwrap();

        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed[0].title, "Legacy");
        assert_eq!(listed[0].preview.len(), PREVIEW_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_list_skips_undecryptable_notes() {
        let (service, session, _temp) = create_test_service().await;

        service.create(&session, "Good", "ok").await.unwrap();
        let bad = service.create(&session, "Bad", "broken").await.unwrap();

        let mut meta = service.repo.get_note(&bad.id).await.unwrap();
        meta.encrypted_title = Some(vec![0; 40]);
        service.repo.update_note(&meta).await.unwrap();
        service.notes.write(&meta.cipher_path, b"garbage").await.unwrap();

        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Good");

        let page = service.list_paginated(&session, 10, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.notes.len(), 1);
        assert_eq!(page.skipped, 1);
    }

    /// Make every statement of `kind` ("INSERT" or "UPDATE") on notes fail
    async fn fail_note_writes(service: &NotesService, kind: &str) {
        let trigger = format!(
            "CREATE TRIGGER fail_note_{kind} BEFORE {kind} ON notes \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
            kind = kind
        );
        sqlx::query(&trigger).execute(service.repo.pool()).await.unwrap();
    }

    async fn cipher_files(temp: &TempDir, dir: &str) -> usize {
        crate::storage::scan_cipher_files(&temp.path().join(dir))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_failed_insert_removes_note_file() {
        let (service, session, temp) = create_test_service().await;

        service.create(&session, "Kept", "a").await.unwrap();
        fail_note_writes(&service, "INSERT").await;

        let result = service.create(&session, "Lost", "b").await;
        assert!(matches!(result, Err(AppError::Database(_))));

        assert_eq!(cipher_files(&temp, "notes").await, 1);
        assert_eq!(service.list(&session).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_removes_fresh_snapshot() {
        let (service, session, temp) = create_test_service().await;

        let note = service.create(&session, "Note", "v0").await.unwrap();
        fail_note_writes(&service, "UPDATE").await;

        let result = service.update(&session, &note.id, "Note", "v1").await;
        assert!(matches!(result, Err(AppError::Database(_))));

        assert_eq!(cipher_files(&temp, "history").await, 0);
        assert!(service.repo.list_history(&note.id).await.unwrap().is_empty());
        assert_eq!(cipher_files(&temp, "notes").await, 1);
    }

    #[tokio::test]
    async fn test_batch_notebook_and_trash() {
        let (service, session, _temp) = create_test_service().await;

        let a = service.create(&session, "A", "").await.unwrap();
        let b = service.create(&session, "B", "").await.unwrap();
        let c = service.create(&session, "C", "").await.unwrap();
        let notebook = service.repo.create_notebook("Archive", "").await.unwrap();
        let ids = vec![a.id.clone(), b.id.clone()];

        service
            .set_notebook_many(&session, &ids, Some(&notebook.id))
            .await
            .unwrap();
        for id in &ids {
            let note = service.get(&session, id).await.unwrap();
            assert_eq!(note.notebook_id.as_deref(), Some(notebook.id.as_str()));
        }
        assert!(service.get(&session, &c.id).await.unwrap().notebook_id.is_none());

        let unknown = service
            .soft_delete_many(&session, &[c.id.clone(), "missing".to_string()])
            .await;
        assert!(matches!(unknown, Err(AppError::NoteNotFound(_))));
        assert_eq!(service.list(&session).await.unwrap().len(), 3);

        service.soft_delete_many(&session, &ids).await.unwrap();
        let visible = service.list(&session).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, c.id);
        assert_eq!(service.list_deleted(&session).await.unwrap().len(), 2);

        session.lock().await;
        let locked = service.soft_delete_many(&session, &[c.id.clone()]).await;
        assert!(matches!(locked, Err(AppError::NotUnlocked)));
    }

    #[tokio::test]
    async fn test_list_includes_tags_and_notebook() {
        let (service, session, _temp) = create_test_service().await;

        let note = service.create(&session, "Tagged", "").await.unwrap();
        let tag = service.repo.create_tag("work", "#123456").await.unwrap();
        service.repo.add_note_tag(&note.id, &tag.id).await.unwrap();
        let notebook = service.repo.create_notebook("Journal", "📓").await.unwrap();

        service
            .set_notebook(&session, &note.id, Some(&notebook.id))
            .await
            .unwrap();

        let listed = service.list(&session).await.unwrap();
        assert_eq!(listed[0].tags, vec![tag.clone()]);
        assert_eq!(listed[0].notebook_id.as_deref(), Some(notebook.id.as_str()));

        let fetched = service.get(&session, &note.id).await.unwrap();
        assert_eq!(fetched.tags, vec![tag]);

        service.set_notebook(&session, &note.id, None).await.unwrap();
        assert!(service.get(&session, &note.id).await.unwrap().notebook_id.is_none());
    }
}
