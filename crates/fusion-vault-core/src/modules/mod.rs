//! Local store of HTML snippet modules ("stacks").
//!
//! Modules are kept newest-first as a plaintext JSON list under their own
//! storage key. Backups are plain JSON arrays and restore with the same
//! incoming-first merge the credential vault uses.

pub mod manager;

pub use manager::{ModuleStore, UploadOutcome};
