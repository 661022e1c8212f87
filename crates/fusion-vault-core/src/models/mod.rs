//! Data models for vault contents.
//!
//! - `Credential`: a named API token with optional webhook
//! - `VaultPayload`, `VaultEnvelope`: the persisted vault, plaintext or encrypted
//! - `Module`: an HTML snippet kept in the module store

pub mod credential;
pub mod envelope;
pub mod module;

pub use credential::{keep_first_active, Credential};
pub use envelope::{VaultEnvelope, VaultPayload};
pub use module::{Module, ModuleId, EMPTY_MODULE_CONTENT};
