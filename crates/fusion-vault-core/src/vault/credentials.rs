use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::Session;
use crate::config::{Config, StorageKeys};
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::models::{keep_first_active, Credential, VaultEnvelope, VaultPayload};
use crate::storage::KeyValueStore;
use crate::utils::{generate_id, merge_by_id};

/// A vault shared between tasks. The mutex queues callers in order, so a
/// save started by one mutation always finishes before the next begins.
pub type SharedVault<S> = Arc<Mutex<CredentialVault<S>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No password has ever been set; persisted as plaintext.
    Open,
    /// Password set, not unlocked in this session.
    Locked,
    /// Password set and unlocked; credentials are in memory.
    Unlocked,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VaultState::Open => "Open (no password)",
            VaultState::Locked => "Locked",
            VaultState::Unlocked => "Protected (unlocked)",
        };
        f.write_str(label)
    }
}

/// What `load` found in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored yet
    Empty,
    Plaintext,
    Encrypted,
    /// Stored value could not be read or parsed; started empty instead
    Corrupt,
}

/// Named credentials with an optional password-protected session.
///
/// Every mutating operation takes `&mut self` and awaits its own save before
/// returning, so persisted state never lags behind memory and two saves can
/// never race. Memory only changes once its save has succeeded.
pub struct CredentialVault<S: KeyValueStore> {
    store: S,
    keys: StorageKeys,
    default_user: String,
    credentials: Vec<Credential>,
    user: String,
    encrypted_bundle: Option<String>,
    session: Session,
}

impl<S: KeyValueStore> CredentialVault<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &Config::default())
    }

    pub fn with_config(store: S, config: &Config) -> Self {
        Self {
            store,
            keys: config.storage_keys.clone(),
            default_user: config.default_user.clone(),
            credentials: Vec::new(),
            user: config.default_user.clone(),
            encrypted_bundle: None,
            session: Session::new(),
        }
    }

    pub fn into_shared(self) -> SharedVault<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ===== State =====

    pub fn state(&self) -> VaultState {
        if self.session.is_active() {
            VaultState::Unlocked
        } else if self.encrypted_bundle.is_some() {
            VaultState::Locked
        } else {
            VaultState::Open
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state() == VaultState::Locked
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == VaultState::Unlocked
    }

    /// True once a password has been set, whether or not it is unlocked now.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted_bundle.is_some()
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn active_credential(&self) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.active)
    }

    /// Token of the active credential, or `None` when there is no active
    /// credential or its token is empty.
    pub fn get_active_token(&self) -> Option<String> {
        self.active_credential()
            .filter(|c| !c.token.is_empty())
            .map(|c| c.token.clone())
    }

    // ===== Persistence =====

    /// Read the persisted envelope, replacing all in-memory state.
    ///
    /// Never fails: unreadable or unparsable data leaves an empty open vault
    /// and is reported as [`LoadOutcome::Corrupt`].
    pub fn load(&mut self) -> LoadOutcome {
        self.reset();

        let raw = match self.store.get(&self.keys.envelope) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.keys.envelope, "No persisted vault, starting empty");
                return LoadOutcome::Empty;
            }
            Err(e) => {
                warn!(key = %self.keys.envelope, error = %e, "Failed to read vault, starting empty");
                return LoadOutcome::Corrupt;
            }
        };

        match serde_json::from_str::<VaultEnvelope>(&raw) {
            Ok(VaultEnvelope::Plaintext(payload)) => {
                self.apply_payload(payload);
                self.sync_collaborators();
                debug!(credentials = self.credentials.len(), "Loaded plaintext vault");
                LoadOutcome::Plaintext
            }
            Ok(VaultEnvelope::Encrypted(bundle)) => {
                self.encrypted_bundle = Some(bundle);
                debug!("Loaded encrypted vault, waiting for unlock");
                LoadOutcome::Encrypted
            }
            Err(e) => {
                warn!(key = %self.keys.envelope, error = %e, "Persisted vault is unparsable, starting empty");
                LoadOutcome::Corrupt
            }
        }
    }

    /// Persist the current contents: encrypted under the session password
    /// when unlocked, plaintext when open.
    pub async fn save(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let payload = self.snapshot();
        self.write_envelope(&payload).await
    }

    /// Store `payload` as the envelope without touching the in-memory copy.
    async fn write_envelope(&mut self, payload: &VaultPayload) -> Result<()> {
        let (envelope, bundle) = match self.session.password() {
            Some(password) => {
                let bundle = crypto::encrypt_in_background(payload, password).await?;
                (VaultEnvelope::Encrypted(bundle.clone()), Some(bundle))
            }
            None => (VaultEnvelope::Plaintext(payload.clone()), None),
        };

        let raw = serde_json::to_string(&envelope)
            .map_err(|e| VaultError::Storage(format!("Failed to serialize vault: {}", e)))?;
        self.store.set(&self.keys.envelope, &raw)?;
        if bundle.is_some() {
            self.encrypted_bundle = bundle;
        }

        debug!(
            encrypted = envelope.is_encrypted(),
            credentials = payload.credentials.len(),
            "Saved vault"
        );
        Ok(())
    }

    // ===== Session =====

    /// Protect the vault with `password`, or rotate the password of an
    /// unlocked vault.
    pub async fn set_password(&mut self, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(VaultError::Validation("password must not be empty".to_string()));
        }
        self.ensure_writable()?;

        let rotating = self.is_unlocked();
        let previous = self.session.start(password);
        if let Err(e) = self.save().await {
            self.session.restore(previous);
            return Err(e);
        }

        info!(rotating, "Vault password set");
        Ok(())
    }

    /// Decrypt the stored envelope with `password`.
    ///
    /// On failure nothing changes. A wrong password and a damaged envelope
    /// both surface as [`VaultError::CannotUnlock`].
    pub async fn unlock(&mut self, password: &str) -> Result<()> {
        let bundle = self
            .encrypted_bundle
            .clone()
            .ok_or(VaultError::NotEncrypted)?;

        let payload: VaultPayload =
            crypto::decrypt_in_background(&bundle, Zeroizing::new(password.to_string()))
                .await
                .map_err(|e| {
                    warn!(error = %e, "Vault unlock failed");
                    VaultError::CannotUnlock(e)
                })?;

        self.apply_payload(payload);
        self.session.start(password);
        self.sync_collaborators();

        info!(credentials = self.credentials.len(), "Vault unlocked");
        Ok(())
    }

    /// End the session, dropping the password and the decrypted copy. The
    /// persisted envelope is untouched. No-op unless unlocked.
    pub fn lock(&mut self) {
        if !self.session.is_active() {
            debug!("Lock requested but vault is not unlocked");
            return;
        }
        self.session.end();
        self.credentials.clear();
        self.user = self.default_user.clone();
        info!("Vault locked");
    }

    // ===== Credentials =====

    /// Add a credential and return its id. The first credential in an empty
    /// vault becomes active.
    pub async fn add_credential(
        &mut self,
        name: &str,
        token: &str,
        webhook: Option<&str>,
    ) -> Result<String> {
        self.ensure_writable()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("credential name is required".to_string()));
        }

        let credential = Credential {
            id: generate_id(),
            name: name.to_string(),
            token: token.trim().to_string(),
            webhook: webhook
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string),
            active: self.credentials.is_empty(),
        };
        let id = credential.id.clone();
        let mut next = self.snapshot();
        next.credentials.push(credential);

        self.commit(next).await?;
        debug!(id = %id, "Added credential");
        Ok(id)
    }

    /// Remove a credential. Missing ids are ignored, and no other
    /// credential is promoted when the active one goes.
    pub async fn remove_credential(&mut self, id: &str) -> Result<()> {
        self.ensure_writable()?;

        let mut next = self.snapshot();
        next.credentials.retain(|c| c.id != id);
        if next.credentials.len() == self.credentials.len() {
            debug!(id, "Remove ignored, credential not found");
            return Ok(());
        }

        self.commit(next).await?;
        debug!(id, "Removed credential");
        Ok(())
    }

    /// Make `id` the only active credential. Unknown ids are ignored.
    pub async fn set_active(&mut self, id: &str) -> Result<()> {
        self.ensure_writable()?;

        if !self.credentials.iter().any(|c| c.id == id) {
            debug!(id, "Activate ignored, credential not found");
            return Ok(());
        }
        let mut next = self.snapshot();
        for credential in next.credentials.iter_mut() {
            credential.active = credential.id == id;
        }

        self.commit(next).await?;
        debug!(id, "Activated credential");
        Ok(())
    }

    /// Set the display name; blank names fall back to the default.
    pub async fn set_user(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;

        let name = name.trim();
        let mut next = self.snapshot();
        next.user = if name.is_empty() {
            self.default_user.clone()
        } else {
            name.to_string()
        };

        self.commit(next).await
    }

    // ===== Backup =====

    /// Merge credentials from a backup. Imported entries take precedence
    /// over existing ones with the same id.
    pub async fn import_backup(&mut self, candidates: Vec<Credential>) -> Result<()> {
        self.ensure_writable()?;

        let incoming = candidates.len();
        let mut next = self.snapshot();
        next.credentials = merge_by_id(candidates, next.credentials);
        keep_first_active(&mut next.credentials);

        self.commit(next).await?;
        info!(incoming, total = self.credentials.len(), "Imported credential backup");
        Ok(())
    }

    /// Parse a backup file (a JSON array of credentials) and merge it.
    pub async fn import_backup_json(&mut self, raw: &str) -> Result<()> {
        self.ensure_writable()?;
        let candidates: Vec<Credential> = serde_json::from_str(raw)
            .map_err(|e| VaultError::CorruptData(format!("invalid credential backup: {}", e)))?;
        self.import_backup(candidates).await
    }

    /// Current credentials as a pretty-printed JSON array.
    pub fn export_backup(&self) -> Result<String> {
        self.ensure_writable()?;
        serde_json::to_string_pretty(&self.credentials)
            .map_err(|e| VaultError::Storage(format!("Failed to serialize backup: {}", e)))
    }

    // ===== Internals =====

    fn ensure_writable(&self) -> Result<()> {
        if self.is_locked() {
            Err(VaultError::Locked)
        } else {
            Ok(())
        }
    }

    fn reset(&mut self) {
        self.session.end();
        self.credentials.clear();
        self.user = self.default_user.clone();
        self.encrypted_bundle = None;
    }

    fn apply_payload(&mut self, payload: VaultPayload) {
        self.credentials = payload.credentials;
        keep_first_active(&mut self.credentials);
        self.user = if payload.user.is_empty() {
            self.default_user.clone()
        } else {
            payload.user
        };
    }

    fn snapshot(&self) -> VaultPayload {
        VaultPayload {
            credentials: self.credentials.clone(),
            user: self.user.clone(),
        }
    }

    /// Save `next`, then adopt it as the in-memory state. A failed save
    /// leaves memory as it was.
    async fn commit(&mut self, next: VaultPayload) -> Result<()> {
        self.write_envelope(&next).await?;
        self.credentials = next.credentials;
        self.user = next.user;
        self.sync_collaborators();
        Ok(())
    }

    /// Publish the active token and display name for the chat and UI.
    /// Failures are logged only: the envelope itself is already stored.
    fn sync_collaborators(&self) {
        if let Err(e) = self.publish_collaborator_keys() {
            warn!(error = %e, "Failed to publish active token and user name");
        }
    }

    fn publish_collaborator_keys(&self) -> Result<()> {
        match self.get_active_token() {
            Some(token) => self.store.set(&self.keys.active_token, &token)?,
            None => self.store.remove(&self.keys.active_token)?,
        }
        self.store.set(&self.keys.user_name, &self.user)
    }
}

impl<S: KeyValueStore> fmt::Debug for CredentialVault<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("state", &self.state())
            .field("credentials", &self.credentials.len())
            .field("user", &self.user)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::FlakyStore;
    use crate::storage::MemoryStore;
    use serde_json::Value;

    const ENVELOPE_KEY: &str = "fusion_os_data_v9";

    fn new_vault() -> CredentialVault<Arc<MemoryStore>> {
        CredentialVault::new(Arc::new(MemoryStore::new()))
    }

    fn reopen(vault: &CredentialVault<Arc<MemoryStore>>) -> CredentialVault<Arc<MemoryStore>> {
        let mut reopened = CredentialVault::new(Arc::clone(vault.store()));
        reopened.load();
        reopened
    }

    fn persisted(vault: &CredentialVault<Arc<MemoryStore>>) -> Value {
        let raw = vault.store().get(ENVELOPE_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn active_count(vault: &CredentialVault<Arc<MemoryStore>>) -> usize {
        vault.credentials().iter().filter(|c| c.active).count()
    }

    fn cred(id: &str, token: &str, active: bool) -> Credential {
        Credential {
            id: id.to_string(),
            name: format!("name-{}", id),
            token: token.to_string(),
            webhook: None,
            active,
        }
    }

    #[tokio::test]
    async fn test_new_vault_is_open_and_empty() {
        let mut vault = new_vault();
        assert_eq!(vault.load(), LoadOutcome::Empty);
        assert_eq!(vault.state(), VaultState::Open);
        assert!(vault.credentials().is_empty());
        assert_eq!(vault.get_active_token(), None);
    }

    #[tokio::test]
    async fn test_first_credential_becomes_active() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok123", None).await.unwrap();
        vault.add_credential("home", "tok456", None).await.unwrap();

        assert_eq!(vault.get_active_token().as_deref(), Some("tok123"));
        assert_eq!(active_count(&vault), 1);
        assert_eq!(
            vault.store().get("di_apiKey").unwrap().as_deref(),
            Some("tok123")
        );
    }

    #[tokio::test]
    async fn test_add_requires_name() {
        let mut vault = new_vault();
        let err = vault.add_credential("   ", "tok", None).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(vault.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_add_trims_and_drops_empty_webhook() {
        let mut vault = new_vault();
        vault.add_credential(" a ", " t ", Some("  ")).await.unwrap();
        vault
            .add_credential("b", "t2", Some("https://hook"))
            .await
            .unwrap();

        let creds = vault.credentials();
        assert_eq!(creds[0].name, "a");
        assert_eq!(creds[0].token, "t");
        assert_eq!(creds[0].webhook, None);
        assert_eq!(creds[1].webhook.as_deref(), Some("https://hook"));
        assert_eq!(creds[1].kind_label(), "WEBHOOK");
    }

    #[tokio::test]
    async fn test_open_vault_persists_plaintext() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();

        let value = persisted(&vault);
        assert_eq!(value["isEncrypted"], Value::Bool(false));
        assert_eq!(value["data"]["keys"][0]["token"], "tok");

        let reopened = reopen(&vault);
        assert_eq!(reopened.state(), VaultState::Open);
        assert_eq!(reopened.credentials(), vault.credentials());
    }

    #[tokio::test]
    async fn test_set_active_switches_exactly_one() {
        let mut vault = new_vault();
        let a = vault.add_credential("a", "ta", None).await.unwrap();
        let b = vault.add_credential("b", "tb", None).await.unwrap();

        vault.set_active(&b).await.unwrap();
        assert_eq!(vault.get_active_token().as_deref(), Some("tb"));
        assert_eq!(active_count(&vault), 1);

        vault.set_active(&a).await.unwrap();
        assert_eq!(vault.get_active_token().as_deref(), Some("ta"));
        assert_eq!(active_count(&vault), 1);
    }

    #[tokio::test]
    async fn test_set_active_unknown_id_is_noop() {
        let mut vault = new_vault();
        vault.add_credential("a", "ta", None).await.unwrap();
        vault.set_active("missing").await.unwrap();
        assert_eq!(vault.get_active_token().as_deref(), Some("ta"));
    }

    #[tokio::test]
    async fn test_remove_active_does_not_promote() {
        let mut vault = new_vault();
        let a = vault.add_credential("a", "ta", None).await.unwrap();
        vault.add_credential("b", "tb", None).await.unwrap();

        vault.remove_credential(&a).await.unwrap();
        assert_eq!(vault.credentials().len(), 1);
        assert_eq!(active_count(&vault), 0);
        assert_eq!(vault.get_active_token(), None);
        assert_eq!(vault.store().get("di_apiKey").unwrap(), None);

        vault.remove_credential("missing").await.unwrap();
        assert_eq!(vault.credentials().len(), 1);
    }

    #[tokio::test]
    async fn test_add_after_emptying_activates_again() {
        let mut vault = new_vault();
        let a = vault.add_credential("a", "ta", None).await.unwrap();
        vault.remove_credential(&a).await.unwrap();
        vault.add_credential("b", "tb", None).await.unwrap();
        assert_eq!(vault.get_active_token().as_deref(), Some("tb"));
    }

    #[tokio::test]
    async fn test_empty_active_token_is_no_key() {
        let mut vault = new_vault();
        vault.add_credential("hook-only", "", Some("https://x")).await.unwrap();
        assert!(vault.active_credential().is_some());
        assert_eq!(vault.get_active_token(), None);
    }

    #[tokio::test]
    async fn test_set_user_publishes_name() {
        let mut vault = new_vault();
        vault.set_user("  Ana ").await.unwrap();
        assert_eq!(vault.user(), "Ana");
        assert_eq!(vault.store().get("di_userName").unwrap().as_deref(), Some("Ana"));

        vault.set_user("").await.unwrap();
        assert_eq!(vault.user(), crate::config::DEFAULT_USER);

        let reopened = reopen(&vault);
        assert_eq!(reopened.user(), crate::config::DEFAULT_USER);
    }

    #[tokio::test]
    async fn test_set_password_encrypts_envelope() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok123", None).await.unwrap();
        vault.set_password("hunter2").await.unwrap();

        assert_eq!(vault.state(), VaultState::Unlocked);
        assert!(vault.is_encrypted());
        let value = persisted(&vault);
        assert_eq!(value["isEncrypted"], Value::Bool(true));
        let bundle = value["data"].as_str().unwrap();
        assert!(!bundle.contains("tok123"));
        assert!(!value.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_set_password_rejects_empty() {
        let mut vault = new_vault();
        let err = vault.set_password("").await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert_eq!(vault.state(), VaultState::Open);
    }

    #[tokio::test]
    async fn test_reload_is_locked_and_hides_credentials() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok123", None).await.unwrap();
        vault.set_password("hunter2").await.unwrap();

        let mut reopened = CredentialVault::new(Arc::clone(vault.store()));
        assert_eq!(reopened.load(), LoadOutcome::Encrypted);
        assert_eq!(reopened.state(), VaultState::Locked);
        assert!(reopened.credentials().is_empty());
        assert_eq!(reopened.get_active_token(), None);
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_vault_locked() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok123", None).await.unwrap();
        vault.set_password("hunter2").await.unwrap();

        let mut reopened = reopen(&vault);
        let err = reopened.unlock("wrong").await.unwrap_err();
        assert!(matches!(err, VaultError::CannotUnlock(_)));
        assert!(err.is_unlock_failure());
        assert!(reopened.is_locked());
        assert!(reopened.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_twice_yields_same_credentials() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok123", None).await.unwrap();
        vault.add_credential("home", "tok456", None).await.unwrap();
        vault.set_password("hunter2").await.unwrap();

        let mut reopened = reopen(&vault);
        reopened.unlock("hunter2").await.unwrap();
        let first = reopened.credentials().to_vec();
        reopened.unlock("hunter2").await.unwrap();
        assert_eq!(reopened.credentials(), first.as_slice());
        assert!(reopened.is_unlocked());
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();
        vault.set_password("pw").await.unwrap();
        let before = vault.store().get(ENVELOPE_KEY).unwrap();

        vault.lock();
        assert!(vault.is_locked());
        assert!(vault.credentials().is_empty());
        vault.lock();
        assert!(vault.is_locked());
        assert_eq!(vault.store().get(ENVELOPE_KEY).unwrap(), before);
    }

    #[tokio::test]
    async fn test_lock_on_open_vault_is_noop() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();
        vault.lock();
        assert_eq!(vault.state(), VaultState::Open);
        assert_eq!(vault.credentials().len(), 1);
    }

    #[tokio::test]
    async fn test_locked_vault_rejects_mutations() {
        let mut vault = new_vault();
        let id = vault.add_credential("work", "tok", None).await.unwrap();
        vault.set_password("pw").await.unwrap();
        vault.lock();
        let before = vault.store().get(ENVELOPE_KEY).unwrap();

        assert!(matches!(
            vault.add_credential("x", "y", None).await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(vault.remove_credential(&id).await, Err(VaultError::Locked)));
        assert!(matches!(vault.set_active(&id).await, Err(VaultError::Locked)));
        assert!(matches!(vault.set_user("x").await, Err(VaultError::Locked)));
        assert!(matches!(vault.import_backup(vec![]).await, Err(VaultError::Locked)));
        assert!(matches!(vault.set_password("new").await, Err(VaultError::Locked)));
        assert!(matches!(vault.save().await, Err(VaultError::Locked)));
        assert!(matches!(vault.export_backup(), Err(VaultError::Locked)));

        assert_eq!(vault.store().get(ENVELOPE_KEY).unwrap(), before);
    }

    #[tokio::test]
    async fn test_unlock_open_vault_is_error() {
        let mut vault = new_vault();
        assert!(matches!(vault.unlock("pw").await, Err(VaultError::NotEncrypted)));
    }

    #[tokio::test]
    async fn test_mutations_while_unlocked_stay_encrypted() {
        let mut vault = new_vault();
        vault.set_password("pw").await.unwrap();
        let first_bundle = persisted(&vault)["data"].as_str().unwrap().to_string();

        vault.add_credential("work", "tok", None).await.unwrap();
        let value = persisted(&vault);
        assert_eq!(value["isEncrypted"], Value::Bool(true));
        assert_ne!(value["data"].as_str().unwrap(), first_bundle);

        let mut reopened = reopen(&vault);
        reopened.unlock("pw").await.unwrap();
        assert_eq!(reopened.get_active_token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_password_rotation() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();
        vault.set_password("old").await.unwrap();
        vault.set_password("new").await.unwrap();

        let mut reopened = reopen(&vault);
        assert!(reopened.unlock("old").await.is_err());
        reopened.unlock("new").await.unwrap();
        assert_eq!(reopened.get_active_token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_unlock_publishes_collaborator_keys() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();
        vault.set_user("Ana").await.unwrap();
        vault.set_password("pw").await.unwrap();

        let store = Arc::clone(vault.store());
        store.remove("di_apiKey").unwrap();
        store.remove("di_userName").unwrap();

        let mut reopened = reopen(&vault);
        assert_eq!(store.get("di_apiKey").unwrap(), None);
        reopened.unlock("pw").await.unwrap();
        assert_eq!(store.get("di_apiKey").unwrap().as_deref(), Some("tok"));
        assert_eq!(store.get("di_userName").unwrap().as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_corrupt_envelope_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(ENVELOPE_KEY, "{not json").unwrap();

        let mut vault = CredentialVault::new(Arc::clone(&store));
        assert_eq!(vault.load(), LoadOutcome::Corrupt);
        assert_eq!(vault.state(), VaultState::Open);
        assert!(vault.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_encrypted_envelope_with_garbage_bundle_fails_unlock() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(ENVELOPE_KEY, r#"{"isEncrypted":true,"data":"garbage"}"#)
            .unwrap();

        let mut vault = CredentialVault::new(Arc::clone(&store));
        assert_eq!(vault.load(), LoadOutcome::Encrypted);
        let err = vault.unlock("pw").await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::CannotUnlock(crypto::CryptoError::Malformed(_))
        ));
        assert!(vault.is_locked());
    }

    #[tokio::test]
    async fn test_loads_legacy_plaintext_with_many_active() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                ENVELOPE_KEY,
                r#"{"isEncrypted":false,"data":{"keys":[
                    {"id":"a","name":"A","token":"ta","active":true},
                    {"id":"b","name":"B","token":"tb","active":true}],"user":"Convidado"}}"#,
            )
            .unwrap();

        let mut vault = CredentialVault::new(Arc::clone(&store));
        assert_eq!(vault.load(), LoadOutcome::Plaintext);
        assert_eq!(active_count(&vault), 1);
        assert_eq!(vault.get_active_token().as_deref(), Some("ta"));
        assert_eq!(vault.user(), "Convidado");
        assert_eq!(store.get("di_apiKey").unwrap().as_deref(), Some("ta"));
    }

    #[tokio::test]
    async fn test_import_backup_first_occurrence_wins() {
        let mut vault = new_vault();
        vault
            .import_backup(vec![cred("a", "2", false), cred("b", "3", false)])
            .await
            .unwrap();
        vault.import_backup(vec![cred("a", "1", false)]).await.unwrap();

        let tokens: Vec<(&str, &str)> = vault
            .credentials()
            .iter()
            .map(|c| (c.id.as_str(), c.token.as_str()))
            .collect();
        assert_eq!(tokens, vec![("a", "1"), ("b", "3")]);
    }

    #[tokio::test]
    async fn test_import_backup_keeps_single_active() {
        let mut vault = new_vault();
        let existing = vault.add_credential("mine", "tm", None).await.unwrap();
        vault
            .import_backup(vec![cred("x", "tx", true), cred("y", "ty", true)])
            .await
            .unwrap();

        assert_eq!(active_count(&vault), 1);
        assert_eq!(vault.get_active_token().as_deref(), Some("tx"));
        let mine = vault.credentials().iter().find(|c| c.id == existing).unwrap();
        assert!(!mine.active);
    }

    #[tokio::test]
    async fn test_import_backup_json_and_export() {
        let mut vault = new_vault();
        vault.add_credential("work", "tok", None).await.unwrap();
        let exported = vault.export_backup().unwrap();

        let mut other = new_vault();
        other.import_backup_json(&exported).await.unwrap();
        assert_eq!(other.credentials(), vault.credentials());

        let err = other.import_backup_json("{\"not\": \"an array\"}").await.unwrap_err();
        assert!(matches!(err, VaultError::CorruptData(_)));
        assert_eq!(other.credentials().len(), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_active_after_mixed_operations() {
        let mut vault = new_vault();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                vault
                    .add_credential(&format!("c{}", i), &format!("t{}", i), None)
                    .await
                    .unwrap(),
            );
            assert!(active_count(&vault) <= 1);
        }
        for (step, id) in ids.iter().enumerate() {
            if step % 2 == 0 {
                vault.set_active(id).await.unwrap();
            } else {
                vault.remove_credential(id).await.unwrap();
            }
            assert!(active_count(&vault) <= 1);
        }
        vault.set_active(&ids[1]).await.unwrap();
        assert!(active_count(&vault) <= 1);
    }

    #[tokio::test]
    async fn test_shared_vault_serializes_saves() {
        let shared = new_vault().into_shared();
        shared.lock().await.set_password("pw").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                shared
                    .lock()
                    .await
                    .add_credential(&format!("c{}", i), &format!("t{}", i), None)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let vault = shared.lock().await;
        let mut reopened = reopen(&vault);
        reopened.unlock("pw").await.unwrap();
        assert_eq!(reopened.credentials().len(), 4);
        assert_eq!(reopened.credentials(), vault.credentials());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_unchanged() {
        let store = Arc::new(FlakyStore::new());
        let mut vault = CredentialVault::new(Arc::clone(&store));
        let a = vault.add_credential("a", "ta", None).await.unwrap();
        let b = vault.add_credential("b", "tb", None).await.unwrap();
        let before = vault.credentials().to_vec();

        store.fail_writes(true);
        assert!(vault.add_credential("c", "tc", None).await.is_err());
        assert!(vault.remove_credential(&a).await.is_err());
        assert!(vault.set_active(&b).await.is_err());
        assert!(vault.set_user("ana").await.is_err());
        assert!(vault
            .import_backup(vec![cred("z", "tz", true)])
            .await
            .is_err());

        assert_eq!(vault.credentials(), &before[..]);
        assert_eq!(vault.user(), crate::config::DEFAULT_USER);
        assert_eq!(vault.get_active_token().as_deref(), Some("ta"));

        store.fail_writes(false);
        let mut reloaded = CredentialVault::new(Arc::clone(&store));
        reloaded.load();
        assert_eq!(reloaded.credentials(), vault.credentials());
    }

    #[tokio::test]
    async fn test_failed_encrypted_save_keeps_session_and_memory() {
        let store = Arc::new(FlakyStore::new());
        let mut vault = CredentialVault::new(Arc::clone(&store));
        vault.add_credential("a", "ta", None).await.unwrap();
        vault.set_password("pw").await.unwrap();

        store.fail_writes(true);
        assert!(vault.add_credential("b", "tb", None).await.is_err());
        assert!(vault.set_password("other").await.is_err());
        assert_eq!(vault.state(), VaultState::Unlocked);
        assert_eq!(vault.credentials().len(), 1);

        store.fail_writes(false);
        let mut reloaded = CredentialVault::new(Arc::clone(&store));
        reloaded.load();
        reloaded.unlock("pw").await.unwrap();
        assert_eq!(reloaded.credentials(), vault.credentials());
    }

    #[tokio::test]
    async fn test_unpublished_token_does_not_fail_saved_mutation() {
        let store = Arc::new(FlakyStore::new());
        store.fail_writes_to("di_apiKey");
        let mut vault = CredentialVault::new(Arc::clone(&store));

        vault.add_credential("a", "ta", None).await.unwrap();
        assert_eq!(vault.get_active_token().as_deref(), Some("ta"));
        assert_eq!(store.get("di_apiKey").unwrap(), None);

        let mut reloaded = CredentialVault::new(Arc::clone(&store));
        assert_eq!(reloaded.load(), LoadOutcome::Plaintext);
        assert_eq!(reloaded.credentials().len(), 1);
    }

    #[tokio::test]
    async fn test_unlock_succeeds_when_token_cannot_be_published() {
        let store = Arc::new(FlakyStore::new());
        let mut vault = CredentialVault::new(Arc::clone(&store));
        vault.add_credential("a", "ta", None).await.unwrap();
        vault.set_password("pw").await.unwrap();
        drop(vault);

        store.fail_writes(true);
        let mut reloaded = CredentialVault::new(Arc::clone(&store));
        assert_eq!(reloaded.load(), LoadOutcome::Encrypted);
        reloaded.unlock("pw").await.unwrap();
        assert_eq!(reloaded.state(), VaultState::Unlocked);
        assert_eq!(reloaded.get_active_token().as_deref(), Some("ta"));
    }
}
