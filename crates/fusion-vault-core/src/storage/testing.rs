//! Store whose writes can be made to fail, for exercising error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{KeyValueStore, MemoryStore};
use crate::error::{Result, VaultError};

#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_all: AtomicBool,
    fail_keys: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` and `remove` fail until turned off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Make writes to `key` fail from now on.
    pub fn fail_writes_to(&self, key: &str) {
        if let Ok(mut keys) = self.fail_keys.lock() {
            keys.push(key.to_string());
        }
    }

    fn check_write(&self, key: &str) -> Result<()> {
        let key_fails = self
            .fail_keys
            .lock()
            .map(|keys| keys.iter().any(|k| k == key))
            .unwrap_or(true);
        if self.fail_all.load(Ordering::SeqCst) || key_fails {
            return Err(VaultError::Storage(format!("write to {} refused", key)));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_write(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_write(key)?;
        self.inner.remove(key)
    }
}
