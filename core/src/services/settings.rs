//! Settings service
//!
//! Validated access to the settings row. A new auto-lock interval takes
//! effect on the session immediately.

use crate::config::{auto_lock_interval, MAX_AUTO_LOCK_MINUTES};
use crate::database::{Repository, Settings};
use crate::error::{AppError, Result};
use crate::services::session::Session;

/// Settings service
#[derive(Clone)]
pub struct SettingsService {
    repo: Repository,
    session: Session,
}

impl SettingsService {
    pub fn new(repo: Repository, session: Session) -> Self {
        Self { repo, session }
    }

    pub async fn get(&self) -> Result<Settings> {
        self.repo.get_settings().await
    }

    /// Persist settings and apply the auto-lock interval
    pub async fn update(&self, settings: &Settings) -> Result<()> {
        if !(0..=MAX_AUTO_LOCK_MINUTES).contains(&settings.auto_lock_minutes) {
            return Err(AppError::InvalidSetting(format!(
                "auto_lock_minutes must be between 0 and {}",
                MAX_AUTO_LOCK_MINUTES
            )));
        }

        self.repo.update_settings(settings).await?;
        self.session
            .set_auto_lock(auto_lock_interval(settings.auto_lock_minutes))
            .await;

        tracing::info!("Settings saved");
        Ok(())
    }

    /// Push the stored auto-lock interval into the session
    pub async fn apply(&self) -> Result<Settings> {
        let settings = self.get().await?;
        self.session
            .set_auto_lock(auto_lock_interval(settings.auto_lock_minutes))
            .await;
        Ok(settings)
    }
}
