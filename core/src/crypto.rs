//! Key hierarchy
//!
//! Two-tier envelope encryption:
//! - a password key, derived with Argon2id, only wraps the data key
//! - the data key encrypts every note; its 32 bytes are symbols of
//!   `[0-9A-Z]`, so it doubles as the human-readable recovery key
//!
//! Ciphertexts are AES-256-GCM with a random nonce prepended:
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use crate::config::{
    ARGON2_MEMORY_KIB, ARGON2_PARALLELISM, ARGON2_TIME_COST, KEY_SIZE, NONCE_SIZE,
    RECOVERY_ALPHABET, RECOVERY_GROUP_LEN, SALT_SIZE,
};
use crate::error::{AppError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, Rng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// The key that encrypts note content.
///
/// Lives in plaintext only inside an unlocked session; every copy is
/// wiped when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl DataKey {
    /// Build a data key from unwrapped key material.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| AppError::Crypto(format!("Data key must be {} bytes", KEY_SIZE)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Overwrite every byte of the key in place.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DataKey").field(&"[REDACTED]").finish()
    }
}

/// Key derived from the master password. Used only to wrap the data key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PasswordKey([u8; KEY_SIZE]);

impl PasswordKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordKey").field(&"[REDACTED]").finish()
    }
}

/// Generate a random 128-bit salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit password key with Argon2id (t=3, m=64 MiB, p=4).
///
/// Deterministic for a given password and salt.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<PasswordKey> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(KEY_SIZE),
    )
    .map_err(|e| AppError::Crypto(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| AppError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(PasswordKey(key))
}

/// Run [`derive_key`] on the blocking pool so the runtime keeps serving
/// timers while Argon2 burns through its memory cost.
pub async fn derive_key_blocking(password: &str, salt: &[u8]) -> Result<PasswordKey> {
    let password = Zeroizing::new(password.to_owned());
    let salt = salt.to_vec();

    tokio::task::spawn_blocking(move || derive_key(&password, &salt))
        .await
        .map_err(|e| AppError::Crypto(format!("Key derivation task failed: {}", e)))?
}

/// Generate a new data key: 32 symbols drawn uniformly from `[0-9A-Z]`.
pub fn generate_data_key() -> DataKey {
    let mut key = [0u8; KEY_SIZE];
    for byte in key.iter_mut() {
        *byte = RECOVERY_ALPHABET[OsRng.gen_range(0..RECOVERY_ALPHABET.len())];
    }
    DataKey(key)
}

/// Render a data key as `XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX`.
pub fn format_data_key_for_display(key: &DataKey) -> String {
    key.as_bytes()
        .chunks(RECOVERY_GROUP_LEN)
        .map(|group| group.iter().map(|&b| b as char).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Parse a recovery key typed by the user.
///
/// Case-insensitive; hyphens and whitespace are ignored. The error message
/// never echoes the input.
pub fn parse_display_key(display: &str) -> Result<DataKey> {
    let symbols: Zeroizing<String> = Zeroizing::new(
        display
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    );

    let count = symbols.chars().count();
    if count != KEY_SIZE {
        return Err(AppError::InvalidKeyFormat(format!(
            "expected {} symbols, found {}",
            KEY_SIZE, count
        )));
    }

    if !symbols
        .bytes()
        .all(|b| RECOVERY_ALPHABET.contains(&b))
    {
        return Err(AppError::InvalidKeyFormat(
            "only digits and letters A-Z are allowed".to_string(),
        ));
    }

    DataKey::from_slice(symbols.as_bytes())
}

/// Encrypt with AES-256-GCM under a fresh random nonce.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Crypto(format!("Cipher initialization failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AppError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext || tag`.
///
/// Wrong keys, truncated blobs and tampered bytes all fail with the same
/// [`AppError::Authentication`].
pub fn decrypt(key: &[u8; KEY_SIZE], blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if blob.len() < NONCE_SIZE {
        return Err(AppError::Authentication);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AppError::Authentication)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| AppError::Authentication)
}
