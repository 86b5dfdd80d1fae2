//! Repository layer for database operations
//!
//! Row-level access to the metadata index. Multi-row changes that must
//! land together (note update + history insert, permanent delete,
//! reordering) run in a single transaction.

use super::models::*;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

const NOTE_COLUMNS: &str = "id, cipher_path, created_at, updated_at, pinned, deleted_at, \
     notebook_id, sort_order, encrypted_title, encrypted_preview";

const NOTE_ORDER: &str = "pinned DESC, sort_order ASC, updated_at DESC";

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Master password =====

    pub async fn has_master_password(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM master_password")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Insert or wholesale replace the singleton record
    pub async fn save_master_password(&self, record: &MasterPasswordRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO master_password (id, salt, verifier, hint, encrypted_data_key)
            VALUES (1, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.salt)
        .bind(&record.verifier)
        .bind(&record.hint)
        .bind(&record.encrypted_data_key)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved master password record");
        Ok(())
    }

    pub async fn get_master_password(&self) -> Result<Option<MasterPasswordRecord>> {
        let record = sqlx::query_as::<_, MasterPasswordRecord>(
            "SELECT salt, verifier, hint, encrypted_data_key FROM master_password WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    // ===== Notes =====

    /// Insert a note row
    pub async fn create_note(&self, note: &NoteMeta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, cipher_path, created_at, updated_at, pinned, deleted_at,
                               notebook_id, sort_order, encrypted_title, encrypted_preview)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(&note.cipher_path)
        .bind(note.created_at)
        .bind(note.updated_at)
        .bind(note.pinned)
        .bind(note.deleted_at)
        .bind(&note.notebook_id)
        .bind(note.sort_order)
        .bind(&note.encrypted_title)
        .bind(&note.encrypted_preview)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Created note row: {}", note.id);
        Ok(())
    }

    /// Get a note by ID, tombstoned or not
    pub async fn get_note(&self, id: &str) -> Result<NoteMeta> {
        sqlx::query_as::<_, NoteMeta>(&format!("SELECT {} FROM notes WHERE id = ?", NOTE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NoteNotFound(id.to_string()))
    }

    /// Write every mutable column of a note row
    pub async fn update_note(&self, note: &NoteMeta) -> Result<()> {
        let rows = Self::update_note_query(note)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(note.id.clone()));
        }

        tracing::debug!("Updated note row: {}", note.id);
        Ok(())
    }

    /// Update a note row and optionally insert a history row as one unit
    pub async fn update_note_with_history(
        &self,
        note: &NoteMeta,
        history: Option<&NoteHistory>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let rows = Self::update_note_query(note)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(note.id.clone()));
        }

        if let Some(h) = history {
            sqlx::query(
                r#"
                INSERT INTO note_history (id, note_id, cipher_path, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&h.id)
            .bind(&h.note_id)
            .bind(&h.cipher_path)
            .bind(h.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Updated note row: {} (history: {})",
            note.id,
            history.map(|h| h.id.as_str()).unwrap_or("none")
        );
        Ok(())
    }

    fn update_note_query(
        note: &NoteMeta,
    ) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        sqlx::query(
            r#"
            UPDATE notes
            SET cipher_path = ?, updated_at = ?, pinned = ?, deleted_at = ?, notebook_id = ?,
                sort_order = ?, encrypted_title = ?, encrypted_preview = ?
            WHERE id = ?
            "#,
        )
        .bind(&note.cipher_path)
        .bind(note.updated_at)
        .bind(note.pinned)
        .bind(note.deleted_at)
        .bind(&note.notebook_id)
        .bind(note.sort_order)
        .bind(&note.encrypted_title)
        .bind(&note.encrypted_preview)
        .bind(&note.id)
    }

    /// List notes in display order
    pub async fn list_notes(&self, include_deleted: bool) -> Result<Vec<NoteMeta>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted_at IS NULL"
        };

        let notes = sqlx::query_as::<_, NoteMeta>(&format!(
            "SELECT {} FROM notes {} ORDER BY {}",
            NOTE_COLUMNS, filter, NOTE_ORDER
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// One page of visible notes plus the total count of visible notes
    pub async fn list_notes_paginated(&self, limit: i64, offset: i64) -> Result<(Vec<NoteMeta>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;

        let notes = sqlx::query_as::<_, NoteMeta>(&format!(
            "SELECT {} FROM notes WHERE deleted_at IS NULL ORDER BY {} LIMIT ? OFFSET ?",
            NOTE_COLUMNS, NOTE_ORDER
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((notes, total))
    }

    /// Tombstoned notes, most recently deleted first
    pub async fn list_deleted_notes(&self) -> Result<Vec<NoteMeta>> {
        let notes = sqlx::query_as::<_, NoteMeta>(&format!(
            "SELECT {} FROM notes WHERE deleted_at IS NOT NULL ORDER BY deleted_at DESC",
            NOTE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Remove a note row and all of its history rows
    pub async fn delete_note_permanently(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM note_history WHERE note_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(id.to_string()));
        }

        tx.commit().await?;

        tracing::debug!("Hard deleted note row: {}", id);
        Ok(())
    }

    /// Assign sort_order by position in `ids`
    pub async fn reorder_notes(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (position, id) in ids.iter().enumerate() {
            sqlx::query("UPDATE notes SET sort_order = ? WHERE id = ?")
                .bind(position as i64)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Assign or clear the notebook of a note
    pub async fn set_note_notebook(&self, id: &str, notebook_id: Option<&str>) -> Result<()> {
        let rows = sqlx::query("UPDATE notes SET notebook_id = ?, updated_at = ? WHERE id = ?")
            .bind(notebook_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Assign or clear the notebook of several notes in one transaction.
    /// An unknown id rolls the whole batch back.
    pub async fn set_notes_notebook(&self, ids: &[String], notebook_id: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for id in ids {
            let rows = sqlx::query("UPDATE notes SET notebook_id = ?, updated_at = ? WHERE id = ?")
                .bind(notebook_id)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if rows == 0 {
                return Err(AppError::NoteNotFound(id.clone()));
            }
        }

        tx.commit().await?;
        tracing::debug!("Moved {} notes to notebook {:?}", ids.len(), notebook_id);
        Ok(())
    }

    /// Tombstone several notes in one transaction. An unknown id rolls the
    /// whole batch back; notes already in the trash keep their timestamp.
    pub async fn soft_delete_notes(&self, ids: &[String], deleted_at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for id in ids {
            let rows = sqlx::query(
                "UPDATE notes SET deleted_at = COALESCE(deleted_at, ?) WHERE id = ?",
            )
            .bind(deleted_at)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 0 {
                return Err(AppError::NoteNotFound(id.clone()));
            }
        }

        tx.commit().await?;
        tracing::debug!("Moved {} notes to trash", ids.len());
        Ok(())
    }

    // ===== History =====

    /// Snapshots of a note, newest first
    pub async fn list_history(&self, note_id: &str) -> Result<Vec<NoteHistory>> {
        let history = sqlx::query_as::<_, NoteHistory>(
            r#"
            SELECT id, note_id, cipher_path, created_at FROM note_history
            WHERE note_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(history)
    }

    pub async fn latest_history(&self, note_id: &str) -> Result<Option<NoteHistory>> {
        let history = sqlx::query_as::<_, NoteHistory>(
            r#"
            SELECT id, note_id, cipher_path, created_at FROM note_history
            WHERE note_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(history)
    }

    pub async fn get_history_entry(&self, note_id: &str, history_id: &str) -> Result<NoteHistory> {
        sqlx::query_as::<_, NoteHistory>(
            "SELECT id, note_id, cipher_path, created_at FROM note_history WHERE id = ? AND note_id = ?",
        )
        .bind(history_id)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::HistoryNotFound(history_id.to_string()))
    }

    pub async fn delete_history(&self, history_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM note_history WHERE id = ?")
            .bind(history_id)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Deleted history row: {}", history_id);
        Ok(())
    }

    // ===== Tags =====

    pub async fn create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let tag = Tag {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            color: color.to_string(),
        };

        sqlx::query("INSERT INTO tags (id, name, color) VALUES (?, ?, ?)")
            .bind(&tag.id)
            .bind(&tag.name)
            .bind(&tag.color)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Created tag: {}", tag.id);
        Ok(tag)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name, color FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    pub async fn delete_tag(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_note_tag(&self, note_id: &str, tag_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_note_tag(&self, note_id: &str, tag_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM note_tags WHERE note_id = ? AND tag_id = ?")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_note_tags(&self, note_id: &str) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name, t.color FROM tags t
            INNER JOIN note_tags nt ON t.id = nt.tag_id
            WHERE nt.note_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    /// Tags of many notes in one query, keyed by note id
    pub async fn get_note_tags_batch(&self, note_ids: &[String]) -> Result<HashMap<String, Vec<Tag>>> {
        let mut result: HashMap<String, Vec<Tag>> = HashMap::new();
        if note_ids.is_empty() {
            return Ok(result);
        }

        let placeholders = vec!["?"; note_ids.len()].join(",");
        let query = format!(
            r#"
            SELECT nt.note_id, t.id, t.name, t.color FROM tags t
            INNER JOIN note_tags nt ON t.id = nt.tag_id
            WHERE nt.note_id IN ({})
            ORDER BY t.name
            "#,
            placeholders
        );

        let mut q = sqlx::query_as::<_, (String, String, String, String)>(&query);
        for id in note_ids {
            q = q.bind(id);
        }

        for (note_id, id, name, color) in q.fetch_all(&self.pool).await? {
            result
                .entry(note_id)
                .or_default()
                .push(Tag { id, name, color });
        }

        Ok(result)
    }

    // ===== Notebooks =====

    pub async fn create_notebook(&self, name: &str, icon: &str) -> Result<Notebook> {
        let next_order: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sort_order) + 1, 0) FROM notebooks")
                .fetch_one(&self.pool)
                .await?;

        let notebook = Notebook {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            sort_order: next_order,
            pinned: false,
        };

        sqlx::query("INSERT INTO notebooks (id, name, icon, sort_order, pinned) VALUES (?, ?, ?, ?, ?)")
            .bind(&notebook.id)
            .bind(&notebook.name)
            .bind(&notebook.icon)
            .bind(notebook.sort_order)
            .bind(notebook.pinned)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Created notebook: {}", notebook.id);
        Ok(notebook)
    }

    pub async fn get_notebook(&self, id: &str) -> Result<Option<Notebook>> {
        let notebook = sqlx::query_as::<_, Notebook>(
            "SELECT id, name, icon, sort_order, pinned FROM notebooks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notebook)
    }

    pub async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        let notebooks = sqlx::query_as::<_, Notebook>(
            "SELECT id, name, icon, sort_order, pinned FROM notebooks ORDER BY pinned DESC, sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(notebooks)
    }

    /// Delete a notebook; its notes keep existing with no notebook
    pub async fn delete_notebook(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM notebooks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Settings =====

    pub async fn get_settings(&self) -> Result<Settings> {
        let settings = sqlx::query_as::<_, Settings>(
            "SELECT auto_lock_minutes, lock_on_minimize, lock_on_sleep FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.unwrap_or(Settings {
            auto_lock_minutes: crate::config::DEFAULT_AUTO_LOCK_MINUTES,
            lock_on_minimize: false,
            lock_on_sleep: true,
        }))
    }

    pub async fn update_settings(&self, settings: &Settings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, auto_lock_minutes, lock_on_minimize, lock_on_sleep)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                auto_lock_minutes = excluded.auto_lock_minutes,
                lock_on_minimize = excluded.lock_on_minimize,
                lock_on_sleep = excluded.lock_on_sleep
            "#,
        )
        .bind(settings.auto_lock_minutes)
        .bind(settings.lock_on_minimize)
        .bind(settings.lock_on_sleep)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Updated settings: {:?}", settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::initialize_database;
    use chrono::{DateTime, Duration};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_repo() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        Repository::new(pool)
    }

    fn note_meta(id: &str, updated_at: DateTime<Utc>) -> NoteMeta {
        NoteMeta {
            id: id.to_string(),
            cipher_path: format!("notes/{}/{}.enc", &id[..2], id),
            created_at: updated_at,
            updated_at,
            pinned: false,
            deleted_at: None,
            notebook_id: None,
            sort_order: 0,
            encrypted_title: Some(vec![1, 2, 3]),
            encrypted_preview: None,
        }
    }

    fn history(id: &str, note_id: &str, created_at: DateTime<Utc>) -> NoteHistory {
        NoteHistory {
            id: id.to_string(),
            note_id: note_id.to_string(),
            cipher_path: format!("history/{}/{}.enc", &id[..2], id),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_master_password_replaced_wholesale() {
        let repo = create_test_repo().await;

        assert!(!repo.has_master_password().await.unwrap());
        assert!(repo.get_master_password().await.unwrap().is_none());

        let first = MasterPasswordRecord {
            salt: vec![1; 16],
            verifier: vec![2; 40],
            hint: "pet".to_string(),
            encrypted_data_key: vec![3; 60],
        };
        repo.save_master_password(&first).await.unwrap();

        let second = MasterPasswordRecord {
            salt: vec![4; 16],
            verifier: vec![5; 40],
            hint: "car".to_string(),
            encrypted_data_key: vec![6; 60],
        };
        repo.save_master_password(&second).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM master_password")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stored = repo.get_master_password().await.unwrap().unwrap();
        assert_eq!(stored.salt, vec![4; 16]);
        assert_eq!(stored.hint, "car");
    }

    #[tokio::test]
    async fn test_create_and_get_note() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        repo.create_note(&note_meta("aa-1", now)).await.unwrap();

        let fetched = repo.get_note("aa-1").await.unwrap();
        assert_eq!(fetched.cipher_path, "notes/aa/aa-1.enc");
        assert_eq!(fetched.encrypted_title, Some(vec![1, 2, 3]));
        assert_eq!(fetched.encrypted_preview, None);
        assert!(!fetched.pinned);

        let missing = repo.get_note("nope").await;
        assert!(matches!(missing, Err(AppError::NoteNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_ordering() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        let old = note_meta("aa-old", now - Duration::hours(2));
        let recent = note_meta("bb-recent", now);
        let mut pinned = note_meta("cc-pinned", now - Duration::hours(5));
        pinned.pinned = true;
        let mut ordered = note_meta("dd-ordered", now - Duration::hours(1));
        ordered.sort_order = 1;
        let mut deleted = note_meta("ee-deleted", now);
        deleted.deleted_at = Some(now);

        for note in [&old, &recent, &pinned, &ordered, &deleted] {
            repo.create_note(note).await.unwrap();
        }

        let ids: Vec<String> = repo
            .list_notes(false)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["cc-pinned", "bb-recent", "aa-old", "dd-ordered"]);

        assert_eq!(repo.list_notes(true).await.unwrap().len(), 5);

        let deleted_ids: Vec<String> = repo
            .list_deleted_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(deleted_ids, vec!["ee-deleted"]);
    }

    #[tokio::test]
    async fn test_paginated_listing() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        for i in 0..5 {
            repo.create_note(&note_meta(&format!("n{}-note", i), now - Duration::minutes(i)))
                .await
                .unwrap();
        }

        let (page, total) = repo.list_notes_paginated(2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "n2-note");
        assert_eq!(page[1].id, "n3-note");
    }

    #[tokio::test]
    async fn test_update_note_with_history() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        let mut note = note_meta("aa-1", now - Duration::hours(1));
        repo.create_note(&note).await.unwrap();

        note.updated_at = now;
        note.encrypted_preview = Some(vec![9]);
        repo.update_note_with_history(&note, Some(&history("h1-x", "aa-1", now)))
            .await
            .unwrap();

        let fetched = repo.get_note("aa-1").await.unwrap();
        assert_eq!(fetched.encrypted_preview, Some(vec![9]));

        let entries = repo.list_history("aa-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "h1-x");
    }

    #[tokio::test]
    async fn test_update_with_history_is_atomic() {
        let repo = create_test_repo().await;
        let before = Utc::now() - Duration::hours(1);

        let mut note = note_meta("aa-1", before);
        repo.create_note(&note).await.unwrap();

        // History row pointing at an unknown note violates the foreign key
        note.updated_at = Utc::now();
        let result = repo
            .update_note_with_history(&note, Some(&history("h1-x", "missing", Utc::now())))
            .await;
        assert!(result.is_err());

        let fetched = repo.get_note("aa-1").await.unwrap();
        assert_eq!(fetched.updated_at, before);
        assert!(repo.list_history("aa-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_note() {
        let repo = create_test_repo().await;

        let result = repo.update_note(&note_meta("zz-1", Utc::now())).await;
        assert!(matches!(result, Err(AppError::NoteNotFound(_))));
    }

    #[tokio::test]
    async fn test_history_ordering_and_latest() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        let note = note_meta("aa-1", now);
        repo.create_note(&note).await.unwrap();

        for (i, age) in [30, 10, 20].iter().enumerate() {
            repo.update_note_with_history(
                &note,
                Some(&history(&format!("h{}-x", i), "aa-1", now - Duration::minutes(*age))),
            )
            .await
            .unwrap();
        }

        let ids: Vec<String> = repo
            .list_history("aa-1")
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["h1-x", "h2-x", "h0-x"]);

        let latest = repo.latest_history("aa-1").await.unwrap().unwrap();
        assert_eq!(latest.id, "h1-x");

        let entry = repo.get_history_entry("aa-1", "h2-x").await.unwrap();
        assert_eq!(entry.cipher_path, "history/h2/h2-x.enc");

        let wrong_note = repo.get_history_entry("other", "h2-x").await;
        assert!(matches!(wrong_note, Err(AppError::HistoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_permanently_removes_history_and_tags() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        let note = note_meta("aa-1", now);
        repo.create_note(&note).await.unwrap();
        repo.update_note_with_history(&note, Some(&history("h1-x", "aa-1", now)))
            .await
            .unwrap();
        let tag = repo.create_tag("work", "#ff0000").await.unwrap();
        repo.add_note_tag("aa-1", &tag.id).await.unwrap();

        repo.delete_note_permanently("aa-1").await.unwrap();

        assert!(matches!(repo.get_note("aa-1").await, Err(AppError::NoteNotFound(_))));
        assert!(repo.list_history("aa-1").await.unwrap().is_empty());
        assert!(repo.get_note_tags("aa-1").await.unwrap().is_empty());
        // The tag itself survives
        assert_eq!(repo.list_tags().await.unwrap().len(), 1);

        let again = repo.delete_note_permanently("aa-1").await;
        assert!(matches!(again, Err(AppError::NoteNotFound(_))));
    }

    #[tokio::test]
    async fn test_tags_batch_lookup() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        repo.create_note(&note_meta("aa-1", now)).await.unwrap();
        repo.create_note(&note_meta("bb-2", now)).await.unwrap();
        repo.create_note(&note_meta("cc-3", now)).await.unwrap();

        let work = repo.create_tag("work", "#ff0000").await.unwrap();
        let home = repo.create_tag("home", "#00ff00").await.unwrap();

        repo.add_note_tag("aa-1", &work.id).await.unwrap();
        repo.add_note_tag("aa-1", &home.id).await.unwrap();
        repo.add_note_tag("aa-1", &home.id).await.unwrap();
        repo.add_note_tag("bb-2", &work.id).await.unwrap();

        let ids = vec!["aa-1".to_string(), "bb-2".to_string(), "cc-3".to_string()];
        let batch = repo.get_note_tags_batch(&ids).await.unwrap();

        let names: Vec<&str> = batch["aa-1"].iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["home", "work"]);
        assert_eq!(batch["bb-2"], vec![work.clone()]);
        assert!(!batch.contains_key("cc-3"));

        repo.remove_note_tag("aa-1", &work.id).await.unwrap();
        assert_eq!(repo.get_note_tags("aa-1").await.unwrap(), vec![home]);

        assert!(repo.get_note_tags_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notebook_delete_clears_note_reference() {
        let repo = create_test_repo().await;

        let notebook = repo.create_notebook("Journal", "📓").await.unwrap();
        let second = repo.create_notebook("Work", "💼").await.unwrap();
        assert_eq!(second.sort_order, notebook.sort_order + 1);

        repo.create_note(&note_meta("aa-1", Utc::now())).await.unwrap();
        repo.set_note_notebook("aa-1", Some(&notebook.id)).await.unwrap();
        assert_eq!(
            repo.get_note("aa-1").await.unwrap().notebook_id,
            Some(notebook.id.clone())
        );

        let missing = repo.set_note_notebook("zz-9", None).await;
        assert!(matches!(missing, Err(AppError::NoteNotFound(_))));

        repo.delete_notebook(&notebook.id).await.unwrap();

        assert!(repo.get_notebook(&notebook.id).await.unwrap().is_none());
        assert_eq!(repo.get_note("aa-1").await.unwrap().notebook_id, None);
        assert_eq!(repo.list_notebooks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reorder_notes() {
        let repo = create_test_repo().await;
        let now = Utc::now();

        for id in ["aa-1", "bb-2", "cc-3"] {
            repo.create_note(&note_meta(id, now)).await.unwrap();
        }

        repo.reorder_notes(&["cc-3".to_string(), "aa-1".to_string(), "bb-2".to_string()])
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_notes(false)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["cc-3", "aa-1", "bb-2"]);
    }

    #[tokio::test]
    async fn test_set_notes_notebook_is_all_or_nothing() {
        let repo = create_test_repo().await;
        let now = Utc::now();
        for id in ["aa-1", "bb-2"] {
            repo.create_note(&note_meta(id, now)).await.unwrap();
        }
        let notebook = repo.create_notebook("Work", "").await.unwrap();
        let ids = vec!["aa-1".to_string(), "bb-2".to_string()];

        let partial = repo
            .set_notes_notebook(&[ids[0].clone(), "zz-9".to_string()], Some(&notebook.id))
            .await;
        assert!(matches!(partial, Err(AppError::NoteNotFound(_))));
        assert!(repo.get_note("aa-1").await.unwrap().notebook_id.is_none());

        repo.set_notes_notebook(&ids, Some(&notebook.id)).await.unwrap();
        for id in &ids {
            assert_eq!(repo.get_note(id).await.unwrap().notebook_id, Some(notebook.id.clone()));
        }

        repo.set_notes_notebook(&ids, None).await.unwrap();
        assert!(repo.get_note("bb-2").await.unwrap().notebook_id.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_notes() {
        let repo = create_test_repo().await;
        let now = Utc::now();
        for id in ["aa-1", "bb-2", "cc-3"] {
            repo.create_note(&note_meta(id, now)).await.unwrap();
        }

        let earlier = now - Duration::hours(1);
        repo.soft_delete_notes(&["aa-1".to_string()], earlier).await.unwrap();

        let missing = repo
            .soft_delete_notes(&["bb-2".to_string(), "zz-9".to_string()], now)
            .await;
        assert!(matches!(missing, Err(AppError::NoteNotFound(_))));
        assert!(repo.get_note("bb-2").await.unwrap().deleted_at.is_none());

        repo.soft_delete_notes(&["aa-1".to_string(), "bb-2".to_string()], now)
            .await
            .unwrap();

        let visible = repo.list_notes(false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "cc-3");
        let kept = repo.get_note("aa-1").await.unwrap().deleted_at.unwrap();
        assert!(kept < now - Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_settings() {
        let repo = create_test_repo().await;

        let defaults = repo.get_settings().await.unwrap();
        assert_eq!(defaults.auto_lock_minutes, 5);
        assert!(!defaults.lock_on_minimize);
        assert!(defaults.lock_on_sleep);

        let updated = Settings {
            auto_lock_minutes: 0,
            lock_on_minimize: true,
            lock_on_sleep: false,
        };
        repo.update_settings(&updated).await.unwrap();

        assert_eq!(repo.get_settings().await.unwrap(), updated);
    }
}
