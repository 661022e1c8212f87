//! The credential vault and its unlock session.
//!
//! This module provides:
//! - `CredentialVault`: named API credentials, the active selection and the
//!   display name, persisted as a plaintext or encrypted envelope
//! - `Session`: the in-memory password of an unlocked vault
//!
//! A vault is `Open` until a password is set, then `Locked` after every
//! load until `unlock` succeeds.

pub mod credentials;
pub mod session;

pub use credentials::{CredentialVault, LoadOutcome, SharedVault, VaultState};
pub use session::Session;
