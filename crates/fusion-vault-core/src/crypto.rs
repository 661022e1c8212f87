//! Password-based encryption of vault payloads.
//!
//! The bundle format is the one the browser widget produces with WebCrypto:
//! PBKDF2-HMAC-SHA256 (100,000 iterations, 16-byte salt) derives an AES-256-GCM
//! key, a 12-byte IV is drawn per encryption, and the result is stored as
//! `{"s": [...], "iv": [...], "d": [...]}` with every byte written as a JSON
//! integer. `d` is the ciphertext with the 16-byte GCM tag appended.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// PBKDF2 rounds. Fixed for compatibility with existing bundles.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes, fresh per encryption.
pub const SALT_LEN: usize = 16;

/// AES-GCM IV length in bytes, fresh per encryption.
pub const IV_LEN: usize = 12;

const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Authentication failed - wrong password or tampered ciphertext")]
    Authentication,

    #[error("Malformed bundle: {0}")]
    Malformed(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crypto task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Encrypted payload as persisted inside the vault envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBundle {
    /// PBKDF2 salt
    pub s: Vec<u8>,
    /// AES-GCM IV
    pub iv: Vec<u8>,
    /// Ciphertext followed by the GCM tag
    pub d: Vec<u8>,
}

impl EncryptedBundle {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let bundle: Self = serde_json::from_str(raw)
            .map_err(|e| CryptoError::Malformed(format!("bundle is not valid JSON: {}", e)))?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<()> {
        if self.s.len() != SALT_LEN {
            return Err(CryptoError::Malformed(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                self.s.len()
            )));
        }
        if self.iv.len() != IV_LEN {
            return Err(CryptoError::Malformed(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                self.iv.len()
            )));
        }
        Ok(())
    }
}

fn derive_key_with_iterations(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *key);
    key
}

/// Derive the AES-256 key for `password` and `salt`.
pub fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    derive_key_with_iterations(password, salt, PBKDF2_ITERATIONS)
}

/// Encrypt raw bytes under a fresh salt and IV.
pub fn encrypt_bytes(plaintext: &[u8], password: &str) -> Result<EncryptedBundle> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedBundle {
        s: salt.to_vec(),
        iv: iv.to_vec(),
        d: ciphertext,
    })
}

/// Decrypt a bundle, failing if the GCM tag does not verify.
pub fn decrypt_bytes(bundle: &EncryptedBundle, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    bundle.validate()?;

    let key = derive_key(password, &bundle.s);
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&bundle.iv), bundle.d.as_ref())
        .map_err(|_| CryptoError::Authentication)?;

    Ok(Zeroizing::new(plaintext))
}

/// Serialize `payload` to JSON and encrypt it, returning the bundle string.
pub fn encrypt<T: Serialize>(payload: &T, password: &str) -> Result<String> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload).map_err(|e| CryptoError::Serialization(e.to_string()))?,
    );
    encrypt_bytes(&plaintext, password)?.to_json()
}

/// Decrypt a bundle string and parse the plaintext as JSON.
pub fn decrypt<T: DeserializeOwned>(bundle: &str, password: &str) -> Result<T> {
    let bundle = EncryptedBundle::from_json(bundle)?;
    let plaintext = decrypt_bytes(&bundle, password)?;
    parse_plaintext(&plaintext)
}

fn parse_plaintext<T: DeserializeOwned>(plaintext: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| CryptoError::Malformed("decrypted payload is not UTF-8".to_string()))?;
    serde_json::from_str(text)
        .map_err(|e| CryptoError::Malformed(format!("decrypted payload is not valid JSON: {}", e)))
}

/// [`encrypt`] on the blocking pool, so key derivation does not stall the runtime.
pub async fn encrypt_in_background<T: Serialize>(
    payload: &T,
    password: Zeroizing<String>,
) -> Result<String> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload).map_err(|e| CryptoError::Serialization(e.to_string()))?,
    );
    let bundle = tokio::task::spawn_blocking(move || encrypt_bytes(&plaintext, &password))
        .await
        .map_err(|e| CryptoError::Task(e.to_string()))??;
    bundle.to_json()
}

/// [`decrypt`] on the blocking pool.
pub async fn decrypt_in_background<T: DeserializeOwned>(
    bundle: &str,
    password: Zeroizing<String>,
) -> Result<T> {
    let bundle = EncryptedBundle::from_json(bundle)?;
    let plaintext = tokio::task::spawn_blocking(move || decrypt_bytes(&bundle, &password))
        .await
        .map_err(|e| CryptoError::Task(e.to_string()))??;
    parse_plaintext(&plaintext)
}

// ============================================================================
// Tests
// ============================================================================
