//! String key-value storage backing the vault.
//!
//! This is the contract the browser's local storage offers: string keys,
//! string values, whole-value reads and writes. Two implementations ship:
//! - `MemoryStore`: process-local, for tests and embedding hosts
//! - `FileStore`: a JSON map on disk, survives restarts like local storage
//!   survives page reloads

pub mod file;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
