use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed - wrong password")]
    Authentication,

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Wrong password and damaged ciphertext look the same to AES-GCM, so
    /// `unlock` reports both as this one outcome. The source carries the
    /// crypto layer's best guess.
    #[error("Cannot unlock vault: {0}")]
    CannotUnlock(#[source] CryptoError),

    #[error("Vault is locked - unlock it first")]
    Locked,

    #[error("Vault has no password set")]
    NotEncrypted,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl VaultError {
    /// True for the outcomes a user can fix by retyping the password.
    pub fn is_unlock_failure(&self) -> bool {
        matches!(
            self,
            VaultError::CannotUnlock(_) | VaultError::Authentication | VaultError::CorruptData(_)
        )
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
