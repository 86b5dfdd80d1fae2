//! Application context and initialization
//!
//! Opens a data directory and wires every service to one metadata pool
//! and one session. Nothing here is global: callers own the `App` and
//! pass its session to note operations.

use crate::config::{
    auto_lock_interval, ATTACHMENTS_DIR, DATA_DIR_ENV, DATA_DIR_NAME, DB_FILE_NAME,
    LEGACY_DATA_DIR_NAME, LEGACY_DB_FILE_NAME,
};
use crate::database::{create_pool, Repository};
use crate::error::{AppError, Result};
use crate::services::{NotesService, Session, SettingsService};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Open data directory with its services
pub struct App {
    data_dir: PathBuf,
    pool: SqlitePool,
    repo: Repository,
    session: Session,
    notes: NotesService,
    settings: SettingsService,
}

impl App {
    /// Open (creating if needed) the store in `data_dir`. The session starts locked.
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        tracing::info!("Opening data directory: {:?}", data_dir);

        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::create_dir_all(data_dir.join(ATTACHMENTS_DIR)).await?;
        rename_legacy_database(&data_dir).await?;

        let pool = create_pool(&data_dir.join(DB_FILE_NAME)).await?;
        let repo = Repository::new(pool.clone());

        let session = Session::new(repo.clone(), &data_dir);
        let notes = NotesService::new(repo.clone(), &data_dir);
        notes.initialize().await?;

        let settings = SettingsService::new(repo.clone(), session.clone());
        let stored = settings.apply().await?;

        tracing::info!(
            "Store ready (auto-lock: {:?})",
            auto_lock_interval(stored.auto_lock_minutes)
        );

        Ok(Self {
            data_dir,
            pool,
            repo,
            session,
            notes,
            settings,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notes(&self) -> &NotesService {
        &self.notes
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Lock the session and close the store
    pub async fn close(self) {
        self.session.lock().await;
        self.pool.close().await;
        tracing::info!("Store closed");
    }
}

/// Data directory: `$SEALNOTES_DATA_DIR` if set, otherwise `~/.sealnotes`
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "home directory not found",
        ))
    })?;

    data_dir_in(&home)
}

/// `<home>/.sealnotes`, taking over a directory left by an earlier installation
fn data_dir_in(home: &Path) -> Result<PathBuf> {
    let dir = home.join(DATA_DIR_NAME);
    let legacy = home.join(LEGACY_DATA_DIR_NAME);

    if !dir.exists() && legacy.is_dir() {
        std::fs::rename(&legacy, &dir)?;
        tracing::info!("Renamed legacy data directory {:?} to {:?}", legacy, dir);
    }

    Ok(dir)
}

/// Rename a legacy store file (and its WAL sidecars) unless a current one exists
async fn rename_legacy_database(data_dir: &Path) -> Result<()> {
    let db = data_dir.join(DB_FILE_NAME);
    let legacy = data_dir.join(LEGACY_DB_FILE_NAME);

    if tokio::fs::try_exists(&db).await? || !tokio::fs::try_exists(&legacy).await? {
        return Ok(());
    }

    for suffix in ["-wal", "-shm"] {
        let from = data_dir.join(format!("{}{}", LEGACY_DB_FILE_NAME, suffix));
        if tokio::fs::try_exists(&from).await? {
            tokio::fs::rename(&from, data_dir.join(format!("{}{}", DB_FILE_NAME, suffix))).await?;
        }
    }
    tokio::fs::rename(&legacy, &db).await?;

    tracing::info!("Renamed legacy database {:?} to {:?}", legacy, db);
    Ok(())
}
