//! Session and lock controller
//!
//! Owns the data key while the store is unlocked. The session starts
//! Locked; setup, unlock and recovery-key reset move it to Unlocked, and
//! an explicit lock, the inactivity timer or an external signal move it
//! back. Locking wipes the resident key.
//!
//! Transitions (setup, unlock, lock, password change and reset, and the
//! timer firing) are serialized by one transition mutex held across the
//! whole operation, KDF included. The state lock is only ever taken inside it
//! or on its own, never the other way round.
//!
//! The auto-lock timer is a tokio task tagged with a generation number.
//! Every re-arm bumps the generation, so a task that wakes up after being
//! superseded does nothing.

use crate::config::{DATA_KEY_VERIFIER_MARKER, PASSWORD_VERIFIER_MARKER, VERIFIER_FILE_NAME};
use crate::crypto::{self, DataKey};
use crate::database::{MasterPasswordRecord, Repository};
use crate::error::{AppError, Result};
use crate::storage::write_atomic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use zeroize::Zeroizing;

/// Invoked after the inactivity timer locks the session
pub type LockCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of a first-run setup
pub struct SetupResult {
    /// Recovery key in `XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX` form
    pub display_key: Zeroizing<String>,
}

struct SessionState {
    data_key: Option<DataKey>,
    last_activity: Instant,
    auto_lock: Option<Duration>,
    timer: Option<JoinHandle<()>>,
    on_lock: Option<LockCallback>,
}

struct SessionInner {
    repo: Repository,
    verifier_path: PathBuf,
    transition: Mutex<()>,
    state: RwLock<SessionState>,
    generation: AtomicU64,
}

/// Lock state of the store. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(repo: Repository, data_dir: &Path) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                repo,
                verifier_path: data_dir.join(VERIFIER_FILE_NAME),
                transition: Mutex::new(()),
                state: RwLock::new(SessionState {
                    data_key: None,
                    last_activity: Instant::now(),
                    auto_lock: None,
                    timer: None,
                    on_lock: None,
                }),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// True until a master password has been set up
    pub async fn is_first_run(&self) -> Result<bool> {
        Ok(!self.inner.repo.has_master_password().await?)
    }

    /// Create the key hierarchy and unlock.
    ///
    /// Uses `recovery_key` as the data key when given, otherwise generates
    /// one. The returned display key must be shown to the user once.
    pub async fn setup(
        &self,
        password: &str,
        hint: &str,
        recovery_key: Option<&str>,
    ) -> Result<SetupResult> {
        let _transition = self.inner.transition.lock().await;

        if self.inner.repo.has_master_password().await? {
            return Err(AppError::AlreadyInitialized);
        }

        let data_key = match recovery_key {
            Some(display) => crypto::parse_display_key(display)?,
            None => crypto::generate_data_key(),
        };

        let record = wrap_data_key(password, hint, &data_key).await?;

        self.write_verifier(&data_key).await?;
        self.inner.repo.save_master_password(&record).await?;

        let display_key = Zeroizing::new(crypto::format_data_key_for_display(&data_key));
        self.install_key(data_key).await;

        tracing::info!("Master password set up");
        Ok(SetupResult { display_key })
    }

    /// Unlock with the master password. Returns false on a wrong password.
    pub async fn unlock(&self, password: &str) -> Result<bool> {
        let _transition = self.inner.transition.lock().await;

        let record = self
            .inner
            .repo
            .get_master_password()
            .await?
            .ok_or(AppError::NotInitialized)?;

        let Some(data_key) = unwrap_data_key(password, &record).await? else {
            tracing::info!("Unlock rejected");
            return Ok(false);
        };

        self.install_key(data_key).await;

        tracing::info!("Session unlocked");
        Ok(true)
    }

    /// Wipe the data key and cancel the timer. Locking a locked session is a no-op.
    pub async fn lock(&self) {
        let _transition = self.inner.transition.lock().await;
        let mut state = self.inner.state.write().await;
        if state.data_key.is_some() {
            tracing::info!("Session locked");
        }
        self.lock_state(&mut state);
    }

    pub async fn is_unlocked(&self) -> bool {
        self.inner.state.read().await.data_key.is_some()
    }

    /// Re-wrap the data key under a new password. Returns false when the
    /// old password is wrong.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        new_hint: &str,
    ) -> Result<bool> {
        let _transition = self.inner.transition.lock().await;
        self.data_key().await?;

        let record = self
            .inner
            .repo
            .get_master_password()
            .await?
            .ok_or(AppError::NotInitialized)?;

        let Some(data_key) = unwrap_data_key(old_password, &record).await? else {
            tracing::info!("Password change rejected");
            return Ok(false);
        };

        let new_record = wrap_data_key(new_password, new_hint, &data_key).await?;
        self.inner.repo.save_master_password(&new_record).await?;
        self.update_activity().await;

        tracing::info!("Master password changed");
        Ok(true)
    }

    /// Set a new password using the recovery key, then unlock.
    /// Returns false when the key does not open the verifier file.
    pub async fn reset_password_with_data_key(
        &self,
        display_key: &str,
        new_password: &str,
        new_hint: &str,
    ) -> Result<bool> {
        let _transition = self.inner.transition.lock().await;
        let data_key = crypto::parse_display_key(display_key)?;

        if !self.check_verifier(&data_key).await? {
            tracing::info!("Password reset rejected");
            return Ok(false);
        }

        let record = wrap_data_key(new_password, new_hint, &data_key).await?;
        self.inner.repo.save_master_password(&record).await?;
        self.install_key(data_key).await;

        tracing::info!("Master password reset with recovery key");
        Ok(true)
    }

    /// Check a recovery key against the verifier file. Malformed keys are
    /// simply wrong.
    pub async fn verify_data_key(&self, display_key: &str) -> Result<bool> {
        match crypto::parse_display_key(display_key) {
            Ok(data_key) => self.check_verifier(&data_key).await,
            Err(_) => Ok(false),
        }
    }

    pub async fn password_hint(&self) -> Result<String> {
        self.inner
            .repo
            .get_master_password()
            .await?
            .map(|record| record.hint)
            .ok_or(AppError::NotInitialized)
    }

    /// Record user activity and push the auto-lock deadline back
    pub async fn update_activity(&self) {
        let mut state = self.inner.state.write().await;
        state.last_activity = Instant::now();
        self.rearm(&mut state);
    }

    /// Configure the inactivity interval; `None` disables auto-lock.
    /// Idle time already accrued counts toward the new interval.
    pub async fn set_auto_lock(&self, interval: Option<Duration>) {
        let mut state = self.inner.state.write().await;
        state.auto_lock = interval;
        self.rearm(&mut state);
        tracing::debug!("Auto-lock interval set to {:?}", interval);
    }

    pub async fn set_lock_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: LockCallback = Arc::new(callback);
        self.inner.state.write().await.on_lock = Some(callback);
    }

    /// Copy of the resident data key, or `NotUnlocked`
    pub async fn data_key(&self) -> Result<DataKey> {
        self.inner
            .state
            .read()
            .await
            .data_key
            .clone()
            .ok_or(AppError::NotUnlocked)
    }

    /// [`Session::data_key`] that also counts as activity
    pub async fn touch(&self) -> Result<DataKey> {
        let mut state = self.inner.state.write().await;
        let data_key = state.data_key.clone().ok_or(AppError::NotUnlocked)?;
        state.last_activity = Instant::now();
        self.rearm(&mut state);
        Ok(data_key)
    }

    async fn install_key(&self, data_key: DataKey) {
        let mut state = self.inner.state.write().await;
        if let Some(mut old) = state.data_key.replace(data_key) {
            old.wipe();
        }
        state.last_activity = Instant::now();
        self.rearm(&mut state);
    }

    fn lock_state(&self, state: &mut SessionState) {
        if let Some(mut data_key) = state.data_key.take() {
            data_key.wipe();
        }
        self.cancel_timer(state);
    }

    fn rearm(&self, state: &mut SessionState) {
        match state.auto_lock {
            Some(interval) if state.data_key.is_some() => {
                let remaining = interval.saturating_sub(state.last_activity.elapsed());
                self.arm_timer(state, remaining)
            }
            _ => self.cancel_timer(state),
        }
    }

    fn cancel_timer(&self, state: &mut SessionState) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn arm_timer(&self, state: &mut SessionState, delay: Duration) {
        self.cancel_timer(state);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Session { inner }.on_timer(generation).await;
            }
        }));
    }

    async fn on_timer(&self, generation: u64) {
        let callback = {
            let _transition = self.inner.transition.lock().await;
            let mut state = self.inner.state.write().await;

            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            // Handle of the running task; dropping it detaches without aborting
            state.timer.take();

            let Some(interval) = state.auto_lock else {
                return;
            };
            if state.data_key.is_none() {
                return;
            }

            let elapsed = state.last_activity.elapsed();
            if elapsed < interval {
                self.arm_timer(&mut state, interval - elapsed);
                return;
            }

            self.lock_state(&mut state);
            tracing::info!("Session auto-locked after {:?} of inactivity", elapsed);
            state.on_lock.clone()
        };

        if let Some(callback) = callback {
            callback();
        }
    }

    async fn write_verifier(&self, data_key: &DataKey) -> Result<()> {
        let blob = crypto::encrypt(data_key.as_bytes(), DATA_KEY_VERIFIER_MARKER)?;
        write_atomic(&self.inner.verifier_path, &blob).await?;
        tracing::debug!("Wrote data key verifier");
        Ok(())
    }

    async fn check_verifier(&self, data_key: &DataKey) -> Result<bool> {
        let blob = match tokio::fs::read(&self.inner.verifier_path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::VerifierMissing)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(matches!(
            crypto::decrypt(data_key.as_bytes(), &blob),
            Ok(marker) if marker.as_slice() == DATA_KEY_VERIFIER_MARKER
        ))
    }
}

/// Build a master password record wrapping `data_key` under a freshly salted password key
async fn wrap_data_key(
    password: &str,
    hint: &str,
    data_key: &DataKey,
) -> Result<MasterPasswordRecord> {
    let salt = crypto::generate_salt();
    let password_key = crypto::derive_key_blocking(password, &salt).await?;

    Ok(MasterPasswordRecord {
        salt: salt.to_vec(),
        verifier: crypto::encrypt(password_key.as_bytes(), PASSWORD_VERIFIER_MARKER)?,
        hint: hint.to_string(),
        encrypted_data_key: crypto::encrypt(password_key.as_bytes(), data_key.as_bytes())?,
    })
}

/// Recover the data key from a record, or `None` if the password is wrong
async fn unwrap_data_key(
    password: &str,
    record: &MasterPasswordRecord,
) -> Result<Option<DataKey>> {
    let password_key = crypto::derive_key_blocking(password, &record.salt).await?;

    match crypto::decrypt(password_key.as_bytes(), &record.verifier) {
        Ok(marker) if marker.as_slice() == PASSWORD_VERIFIER_MARKER => {}
        _ => return Ok(None),
    }

    match crypto::decrypt(password_key.as_bytes(), &record.encrypted_data_key) {
        Ok(raw) => Ok(DataKey::from_slice(&raw).ok()),
        Err(_) => Ok(None),
    }
}
