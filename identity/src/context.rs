use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config_store::{ConfigStore, IdentityConfig};
use crate::errors::{IdentityError, IdentityResult};
use crate::keys::{Address, IdentityKeyPair};
use crate::ledger::LedgerClient;
use crate::mnemonic;
use crate::session::SessionManager;
use crate::storage::{
    IdentityPaths, VaultCreateParams, VaultManager, VaultMetadata, VaultSecrets,
};
use crate::transaction::{self, UbtTransaction};
use crate::validation::InputValidator;
use crate::verifier::{MemoryReplayGuard, TransactionVerifier};

/// Wires the identity subsystem together for the host application: paths,
/// vault, configuration, and the single per-device session.
pub struct IdentityContext {
    paths: IdentityPaths,
    vault: VaultManager,
    config_store: ConfigStore,
    session: SessionManager,
    validator: InputValidator,
    replay_guard: Arc<MemoryReplayGuard>,
    environment: String,
}

impl IdentityContext {
    pub fn initialize(root_dir: PathBuf) -> IdentityResult<Self> {
        let environment =
            std::env::var("UBT_IDENTITY_ENV").unwrap_or_else(|_| "development".to_string());
        let paths = IdentityPaths::new(&root_dir)?;
        paths.ensure_directories()?;

        let vault = VaultManager::from_paths(&paths);
        let config_store = ConfigStore::from_paths(&paths);
        let initial_config = config_store.load_or_default(environment.clone())?;
        let session_timeout = duration_from_minutes(initial_config.session.auto_lock_minutes);
        let session = SessionManager::new(
            session_timeout,
            initial_config.session.max_failed_attempts.max(1),
        );
        let validator = InputValidator::new()?;

        log::info!("Identity context initialized ({})", environment);

        Ok(Self {
            paths,
            vault,
            config_store,
            session,
            validator,
            replay_guard: Arc::new(MemoryReplayGuard::new()),
            environment,
        })
    }

    pub fn vault(&self) -> &VaultManager {
        &self.vault
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn paths(&self) -> &IdentityPaths {
        &self.paths
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn load_config(&self) -> IdentityResult<IdentityConfig> {
        self.config_store.load_or_default(self.environment.clone())
    }

    pub fn update_config<F>(&mut self, updater: F) -> IdentityResult<IdentityConfig>
    where
        F: FnOnce(&mut IdentityConfig) -> IdentityResult<()>,
    {
        let updated = self
            .config_store
            .update(self.environment.clone(), updater)?;
        let session_timeout = duration_from_minutes(updated.session.auto_lock_minutes);
        self.session =
            SessionManager::new(session_timeout, updated.session.max_failed_attempts.max(1));
        Ok(updated)
    }

    /// Build a ledger client against the configured primary endpoint.
    pub fn ledger_client(&self) -> IdentityResult<LedgerClient> {
        let config = self.load_config()?;
        LedgerClient::new(config.ledger.primary_endpoint)
    }

    /// Build a verifier with the configured clock-skew window.
    ///
    /// All verifiers from the same context share one replay guard, so a hash
    /// recorded through any of them is rejected as a replay by the others.
    pub fn transaction_verifier(&self) -> IdentityResult<TransactionVerifier> {
        let config = self.load_config()?;
        Ok(TransactionVerifier::new(
            self.replay_guard.clone(),
            Duration::from_secs(config.verify.clock_skew_secs),
        ))
    }

    /// Whether this device already holds an identity vault.
    pub fn has_identity(&self) -> bool {
        self.vault.has_vault()
    }

    /// Genesis flow: mint a fresh identity, protect it behind the PIN, and
    /// return the recovery phrase for one-time display to the user.
    ///
    /// Fails if an identity already exists; replacing one goes through
    /// [`restore_identity`](Self::restore_identity) or
    /// [`reset_identity`](Self::reset_identity) deliberately.
    pub fn create_identity(
        &self,
        name: &str,
        pin: &SecretString,
        word_count: usize,
    ) -> IdentityResult<String> {
        self.validator.validate_identity_name(name)?;

        let phrase = mnemonic::generate(word_count)?;
        self.write_vault(name, pin, &phrase, false)?;
        log::info!("Genesis identity created");
        Ok(phrase)
    }

    /// Restore an identity from an existing recovery phrase, replacing any
    /// vault already on the device.
    pub fn restore_identity(
        &self,
        name: &str,
        phrase: &str,
        pin: &SecretString,
    ) -> IdentityResult<()> {
        self.validator.validate_identity_name(name)?;
        mnemonic::validate(phrase)?;

        self.write_vault(name, pin, phrase, true)?;
        log::info!("Identity restored from recovery phrase");
        Ok(())
    }

    /// Unlock the identity with the PIN. The KDF is CPU and memory bound;
    /// UI callers should prefer [`unlock_async`](Self::unlock_async).
    pub fn unlock(&self, pin: &SecretString) -> IdentityResult<()> {
        let unlock_result = self.vault.unlock(pin);
        self.finish_unlock(unlock_result)
    }

    /// Unlock on a blocking worker so the caller's executor stays
    /// responsive. Dropping the returned future before completion discards
    /// any partially derived key material and leaves the session locked.
    pub async fn unlock_async(&self, pin: SecretString) -> IdentityResult<()> {
        let vault = self.vault.clone();
        let unlock_result = tokio::task::spawn_blocking(move || vault.unlock(&pin))
            .await
            .map_err(|e| IdentityError::Unknown(format!("Unlock task failed: {}", e)))?;
        self.finish_unlock(unlock_result)
    }

    pub fn lock(&self) {
        self.session.lock();
    }

    /// The unlocked identity's public address.
    pub fn public_key(&self) -> IdentityResult<Address> {
        self.session.public_key()
    }

    /// Sign a UBT transfer to `receiver` with the unlocked identity's key.
    pub fn sign_transfer(&self, receiver: Address, amount: u64) -> IdentityResult<UbtTransaction> {
        self.validator.validate_amount(amount)?;
        transaction::sign_transfer(&self.session, receiver, amount)
    }

    /// Irreversibly delete the identity vault and its backups. Explicit user
    /// confirmation is the caller's responsibility.
    pub fn reset_identity(&self) -> IdentityResult<()> {
        self.session.lock();
        self.vault.reset()
    }

    fn write_vault(
        &self,
        name: &str,
        pin: &SecretString,
        phrase: &str,
        allow_replace: bool,
    ) -> IdentityResult<()> {
        self.validator.validate_pin(pin.expose_secret())?;

        let seed = mnemonic::to_seed(phrase, "")?;
        let keypair = IdentityKeyPair::from_seed(&seed);

        let mut metadata = VaultMetadata::new(name);
        metadata.public_key_hex = Some(keypair.public_key_hex());

        let params = VaultCreateParams {
            pin,
            metadata,
            secrets: VaultSecrets::new(phrase),
        };

        if allow_replace {
            self.vault.save(params)
        } else {
            self.vault.create(params)
        }
    }

    fn finish_unlock(
        &self,
        unlock_result: IdentityResult<crate::storage::VaultUnlocked>,
    ) -> IdentityResult<()> {
        match unlock_result {
            Ok(unlocked) => self.session.unlock(unlocked),
            Err(IdentityError::WrongPinOrCorrupt) => {
                log::warn!("Vault unlock failed");
                match self.session.register_failed_attempt() {
                    Ok(_remaining) => Err(IdentityError::WrongPinOrCorrupt),
                    Err(lockout) => Err(lockout),
                }
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityContext")
            .field("paths", &self.paths)
            .field("environment", &self.environment)
            .field("locked", &self.session.is_locked())
            .finish()
    }
}

/// Shared identity context handed to the host application's UI layer.
#[derive(Clone)]
pub struct SharedIdentityContext(pub Arc<RwLock<IdentityContext>>);

impl SharedIdentityContext {
    pub fn new(inner: IdentityContext) -> Self {
        Self(Arc::new(RwLock::new(inner)))
    }

    pub fn read<F, T>(&self, op: F) -> IdentityResult<T>
    where
        F: FnOnce(&IdentityContext) -> IdentityResult<T>,
    {
        let guard = self
            .0
            .read()
            .map_err(|_| IdentityError::Unknown("Poisoned identity context".into()))?;
        op(&guard)
    }

    pub fn write<F, T>(&self, op: F) -> IdentityResult<T>
    where
        F: FnOnce(&mut IdentityContext) -> IdentityResult<T>,
    {
        let mut guard = self
            .0
            .write()
            .map_err(|_| IdentityError::Unknown("Poisoned identity context".into()))?;
        op(&mut guard)
    }
}

fn duration_from_minutes(minutes: u32) -> Duration {
    let clamped = minutes.max(1) as u64;
    Duration::from_secs(clamped.saturating_mul(60))
}
