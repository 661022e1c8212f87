//! Core library for fusion-vault.
//!
//! A password-protected store of API credentials for the Fusion OS widget,
//! plus the local module (stack) store it sits beside. Both persist into a
//! string key-value store, the same contract browser local storage offers.
//!
//! The encrypted envelope is byte-compatible with what the browser widget
//! writes: PBKDF2-SHA256 (100,000 rounds) and AES-256-GCM, with salt, IV and
//! ciphertext stored as JSON integer arrays.

pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod modules;
pub mod storage;
pub mod utils;
pub mod vault;

pub use config::{Config, StorageKeys};
pub use crypto::{CryptoError, EncryptedBundle};
pub use error::{Result, VaultError};
pub use models::{Credential, Module, ModuleId, VaultEnvelope, VaultPayload};
pub use modules::{ModuleStore, UploadOutcome};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use vault::{CredentialVault, LoadOutcome, SharedVault, VaultState};
