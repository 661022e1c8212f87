use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, StorageKeys};
use crate::error::{Result, VaultError};
use crate::models::Module;
use crate::storage::KeyValueStore;
use crate::utils::merge_by_id;

/// Result of [`ModuleStore::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was a backup; this many modules were in it.
    Restored(usize),
    /// The file was stored as one new module with this id.
    Stored(String),
}

pub struct ModuleStore<S: KeyValueStore> {
    store: S,
    key: String,
    modules: Vec<Module>,
}

impl<S: KeyValueStore> ModuleStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_keys(store, &Config::default().storage_keys)
    }

    pub fn with_keys(store: S, keys: &StorageKeys) -> Self {
        Self {
            store,
            key: keys.modules.clone(),
            modules: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the persisted list. Unparsable content leaves an empty list.
    pub fn load(&mut self) {
        self.modules.clear();
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read modules");
                return;
            }
        };
        match serde_json::from_str::<Vec<Module>>(&raw) {
            Ok(modules) => {
                debug!(count = modules.len(), "Loaded modules");
                self.modules = modules;
            }
            Err(e) => warn!(key = %self.key, error = %e, "Stored modules are unparsable, starting empty"),
        }
    }

    /// Write `next` and adopt it. On failure the in-memory list is untouched.
    fn commit(&mut self, next: Vec<Module>) -> Result<()> {
        let raw = serde_json::to_string(&next)
            .map_err(|e| VaultError::Storage(format!("Failed to serialize modules: {}", e)))?;
        self.store.set(&self.key, &raw)?;
        self.modules = next;
        Ok(())
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id.matches(id))
    }

    /// Create a module at the front of the list and return its id.
    pub fn save_module(&mut self, title: &str, content: &str) -> Result<String> {
        let title = validate_title(title)?;
        let module = Module::new(title, content);
        let id = module.id.to_string();

        let mut next = Vec::with_capacity(self.modules.len() + 1);
        next.push(module);
        next.extend(self.modules.iter().cloned());
        self.commit(next)?;
        debug!(id = %id, "Created module");
        Ok(id)
    }

    pub fn update_module(&mut self, id: &str, title: &str, content: &str) -> Result<()> {
        let title = validate_title(title)?;
        let mut next = self.modules.clone();
        next.iter_mut()
            .find(|m| m.id.matches(id))
            .ok_or_else(|| VaultError::NotFound(format!("module {}", id)))?
            .edit(title, content);

        self.commit(next)?;
        debug!(id, "Updated module");
        Ok(())
    }

    /// Delete a module; missing ids are ignored.
    pub fn delete_module(&mut self, id: &str) -> Result<()> {
        if !self.modules.iter().any(|m| m.id.matches(id)) {
            return Ok(());
        }
        let next = self
            .modules
            .iter()
            .filter(|m| !m.id.matches(id))
            .cloned()
            .collect();
        self.commit(next)?;
        debug!(id, "Deleted module");
        Ok(())
    }

    /// All modules as a pretty-printed JSON array.
    pub fn export_backup(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.modules)
            .map_err(|e| VaultError::Storage(format!("Failed to serialize backup: {}", e)))
    }

    /// Merge a backup into the store; backup entries win on shared ids.
    /// Returns the number of modules in the backup.
    pub fn restore_backup(&mut self, raw: &str) -> Result<usize> {
        let incoming = parse_backup(raw)?;
        let count = incoming.len();
        let next = merge_by_id(incoming, self.modules.clone());
        self.commit(next)?;
        info!(count, total = self.modules.len(), "Restored module backup");
        Ok(count)
    }

    /// Take an uploaded file: restore it if it is a backup, otherwise keep
    /// it as a new module titled with the file name. A backup-shaped file
    /// whose entries do not parse is kept as a module too.
    pub fn upload(&mut self, file_name: &str, text: &str) -> Result<UploadOutcome> {
        if looks_like_backup(text) {
            match self.restore_backup(text) {
                Ok(count) => return Ok(UploadOutcome::Restored(count)),
                Err(VaultError::CorruptData(reason)) => {
                    warn!(file_name, %reason, "Backup-shaped upload did not parse, storing as module");
                }
                Err(e) => return Err(e),
            }
        }
        let id = self.save_module(file_name, text)?;
        Ok(UploadOutcome::Stored(id))
    }
}

fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        Err(VaultError::Validation("module title is required".to_string()))
    } else {
        Ok(title)
    }
}

/// A backup is a non-empty JSON array whose first element has an id.
fn looks_like_backup(raw: &str) -> bool {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .first()
            .and_then(|first| first.get("id"))
            .is_some_and(|id| !id.is_null()),
        _ => false,
    }
}

fn parse_backup(raw: &str) -> Result<Vec<Module>> {
    if !looks_like_backup(raw) {
        return Err(VaultError::CorruptData(
            "module backup must be a JSON array of modules".to_string(),
        ));
    }
    serde_json::from_str(raw)
        .map_err(|e| VaultError::CorruptData(format!("invalid module backup: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
