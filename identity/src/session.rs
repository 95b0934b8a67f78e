use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use crate::errors::{IdentityError, IdentityResult};
use crate::keys::{Address, IdentityKeyPair};
use crate::mnemonic;
use crate::storage::{VaultMetadata, VaultUnlocked};

/// Default duration before an unlocked identity automatically locks.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// The in-memory, never-persisted state of an unlocked identity.
///
/// Holds the keypair re-derived from the decrypted mnemonic. Dropped (and
/// zeroized) on lock, timeout, or process exit; there is no serialization
/// path in or out.
struct UnlockedSession {
    metadata: VaultMetadata,
    keypair: IdentityKeyPair,
    mnemonic: Zeroizing<String>,
    unlocked_at: Instant,
    expires_at: Instant,
}

impl UnlockedSession {
    fn new(unlocked: VaultUnlocked, timeout: Duration) -> IdentityResult<Self> {
        let seed = mnemonic::to_seed(&unlocked.secrets.mnemonic_phrase, "")?;
        let keypair = IdentityKeyPair::from_seed(&seed);
        let now = Instant::now();

        Ok(Self {
            metadata: unlocked.metadata,
            keypair,
            mnemonic: Zeroizing::new(unlocked.secrets.mnemonic_phrase.clone()),
            unlocked_at: now,
            expires_at: now + timeout,
        })
    }

    fn touch(&mut self, timeout: Duration) {
        self.expires_at = Instant::now() + timeout;
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
struct SessionState {
    unlocked: Option<UnlockedSession>,
    failed_attempts: u32,
    next_allowed_attempt: Option<Instant>,
    backoff_exponent: u32,
}

/// Manages identity unlock state with automatic locking and a failed-attempt
/// counter hook for upstream lockout policy.
///
/// State machine: NoVault → (save) → Locked → (unlock) → Unlocked →
/// (lock | timeout | exit) → Locked. A failed unlock stays in Locked. The
/// private key is reachable only through `with_signing_key` while Unlocked.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    timeout: Duration,
    max_failed_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    max_backoff_exponent: u32,
}

impl SessionManager {
    pub fn new(timeout: Duration, max_failed_attempts: u32) -> Self {
        Self::with_backoff(
            timeout,
            max_failed_attempts,
            Duration::from_secs(1),
            Duration::from_secs(32),
        )
    }

    pub fn with_backoff(
        timeout: Duration,
        max_failed_attempts: u32,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            timeout,
            max_failed_attempts,
            backoff_base,
            backoff_cap,
            max_backoff_exponent: 8,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT, 5)
    }

    pub fn is_locked(&self) -> bool {
        let state = self.state.read();
        state.unlocked.is_none()
    }

    /// Move to Unlocked with decrypted vault contents, deriving the keypair.
    pub fn unlock(&self, unlocked: VaultUnlocked) -> IdentityResult<()> {
        let session = UnlockedSession::new(unlocked, self.timeout)?;
        let mut state = self.state.write();
        state.failed_attempts = 0;
        state.unlocked = Some(session);
        state.next_allowed_attempt = None;
        state.backoff_exponent = 0;
        Ok(())
    }

    /// Record a failed unlock attempt and return remaining attempts.
    ///
    /// Applies an exponential delay between attempts; after the configured
    /// maximum the session refuses further attempts until re-created.
    pub fn register_failed_attempt(&self) -> IdentityResult<u32> {
        let mut state = self.state.write();
        let now = Instant::now();

        if let Some(until) = state.next_allowed_attempt {
            if now < until {
                let remaining = until.saturating_duration_since(now);
                return Err(IdentityError::PermissionDenied(format!(
                    "Unlock temporarily disabled. Retry in {}.{:03} seconds",
                    remaining.as_secs(),
                    remaining.subsec_millis()
                )));
            }
        }

        state.failed_attempts += 1;
        if state.failed_attempts >= self.max_failed_attempts {
            state.unlocked = None;
            state.next_allowed_attempt = None;
            state.backoff_exponent = 0;
            return Err(IdentityError::PermissionDenied(
                "Maximum unlock attempts exceeded".to_string(),
            ));
        }
        state.backoff_exponent = (state.backoff_exponent + 1).min(self.max_backoff_exponent);
        let multiplier = 1_u32 << state.backoff_exponent.saturating_sub(1);
        let mut delay = if multiplier <= 1 {
            self.backoff_base
        } else {
            self.backoff_base
                .checked_mul(multiplier)
                .unwrap_or(self.backoff_cap)
        };
        if delay > self.backoff_cap {
            delay = self.backoff_cap;
        }
        state.next_allowed_attempt = Some(now + delay);

        Ok(self.max_failed_attempts - state.failed_attempts)
    }

    /// Explicitly lock the session, zeroizing key material. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state.write();
        state.unlocked = None;
        state.next_allowed_attempt = None;
        state.backoff_exponent = 0;
    }

    /// The identity's public address; available whenever unlocked,
    /// independent of signing.
    pub fn public_key(&self) -> IdentityResult<Address> {
        self.peek(|session| Ok(session.keypair.address()))
    }

    /// How long the current session has been unlocked, if it is.
    pub fn unlocked_since(&self) -> Option<Duration> {
        let state = self.state.read();
        state
            .unlocked
            .as_ref()
            .filter(|s| !s.is_expired())
            .map(|s| s.unlocked_at.elapsed())
    }

    /// Access the signing key while refreshing the inactivity timeout.
    pub fn with_signing_key<F, T>(&self, operation: F) -> IdentityResult<T>
    where
        F: FnOnce(&SigningKey, Address) -> IdentityResult<T>,
    {
        let mut state = self.state.write();
        let session = state.unlocked.as_mut().ok_or(IdentityError::NotUnlocked)?;

        if session.is_expired() {
            state.unlocked = None;
            return Err(IdentityError::NotUnlocked);
        }

        session.touch(self.timeout);
        let address = session.keypair.address();
        operation(session.keypair.signing_key(), address)
    }

    /// Access the decrypted recovery phrase (for backup display) while
    /// refreshing the timeout.
    pub fn with_mnemonic<F, T>(&self, operation: F) -> IdentityResult<T>
    where
        F: FnOnce(&VaultMetadata, &str) -> IdentityResult<T>,
    {
        let mut state = self.state.write();
        let session = state.unlocked.as_mut().ok_or(IdentityError::NotUnlocked)?;

        if session.is_expired() {
            state.unlocked = None;
            return Err(IdentityError::NotUnlocked);
        }

        session.touch(self.timeout);
        operation(&session.metadata, &session.mnemonic)
    }

    pub fn remaining_attempts(&self) -> u32 {
        let state = self.state.read();
        self.max_failed_attempts
            .saturating_sub(state.failed_attempts)
    }

    /// Read-only access without extending the timeout.
    fn peek<F, T>(&self, operation: F) -> IdentityResult<T>
    where
        F: FnOnce(&UnlockedSession) -> IdentityResult<T>,
    {
        let state = self.state.read();
        let session = state.unlocked.as_ref().ok_or(IdentityError::NotUnlocked)?;

        if session.is_expired() {
            drop(state);
            self.lock();
            return Err(IdentityError::NotUnlocked);
        }

        operation(session)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("locked", &self.is_locked())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{VaultMetadata, VaultSecrets};

    const TEST_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn unlocked() -> VaultUnlocked {
        VaultUnlocked {
            metadata: VaultMetadata::new("Session Test"),
            secrets: VaultSecrets::new(TEST_PHRASE),
        }
    }

    #[test]
    fn unlock_and_lock_cycle() {
        let manager = SessionManager::with_defaults();
        assert!(manager.is_locked());

        manager.unlock(unlocked()).unwrap();
        assert!(!manager.is_locked());
        assert!(manager.public_key().is_ok());
        assert!(manager.unlocked_since().is_some());

        manager.lock();
        assert!(manager.is_locked());
        assert_eq!(manager.public_key().unwrap_err(), IdentityError::NotUnlocked);

        // lock() is idempotent
        manager.lock();
        assert!(manager.is_locked());
    }

    #[test]
    fn signing_key_unavailable_after_lock() {
        let manager = SessionManager::with_defaults();
        manager.unlock(unlocked()).unwrap();
        manager.lock();

        let result = manager.with_signing_key(|_, _| Ok(()));
        assert_eq!(result.unwrap_err(), IdentityError::NotUnlocked);
    }

    #[test]
    fn timeout_enforced() {
        let manager = SessionManager::new(Duration::from_millis(10), 5);
        manager.unlock(unlocked()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let result = manager.with_signing_key(|_, _| Ok(()));
        assert_eq!(result.unwrap_err(), IdentityError::NotUnlocked);
        assert!(manager.is_locked());
    }

    #[test]
    fn unlock_derives_stable_public_key() {
        let manager = SessionManager::with_defaults();
        manager.unlock(unlocked()).unwrap();
        let first = manager.public_key().unwrap();
        manager.lock();
        manager.unlock(unlocked()).unwrap();
        assert_eq!(manager.public_key().unwrap(), first);
    }

    #[test]
    fn rejects_corrupt_mnemonic_on_unlock() {
        let manager = SessionManager::with_defaults();
        let bad = VaultUnlocked {
            metadata: VaultMetadata::new("Bad"),
            secrets: VaultSecrets::new("not a valid phrase at all"),
        };
        assert!(matches!(
            manager.unlock(bad),
            Err(IdentityError::InvalidMnemonic(_))
        ));
        assert!(manager.is_locked());
    }

    #[test]
    fn failed_attempts_limit() {
        let manager = SessionManager::with_backoff(
            DEFAULT_SESSION_TIMEOUT,
            2,
            Duration::from_millis(10),
            Duration::from_millis(80),
        );
        assert_eq!(manager.remaining_attempts(), 2);
        assert_eq!(manager.register_failed_attempt().unwrap(), 1);
        std::thread::sleep(Duration::from_millis(15));
        let err = manager.register_failed_attempt().unwrap_err();
        assert!(matches!(err, IdentityError::PermissionDenied(_)));
        assert_eq!(manager.remaining_attempts(), 0);
    }

    #[test]
    fn register_failed_attempt_enforces_backoff() {
        let manager = SessionManager::with_backoff(
            DEFAULT_SESSION_TIMEOUT,
            5,
            Duration::from_millis(10),
            Duration::from_millis(160),
        );
        assert_eq!(manager.register_failed_attempt().unwrap(), 4);
        let err = manager.register_failed_attempt().unwrap_err();
        assert!(matches!(err, IdentityError::PermissionDenied(msg) if msg.contains("Retry")));
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(manager.register_failed_attempt().unwrap(), 3);
    }

    #[test]
    fn successful_unlock_resets_failure_counter() {
        let manager = SessionManager::with_backoff(
            DEFAULT_SESSION_TIMEOUT,
            5,
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        manager.register_failed_attempt().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        manager.register_failed_attempt().unwrap();
        assert_eq!(manager.remaining_attempts(), 3);

        manager.unlock(unlocked()).unwrap();
        assert_eq!(manager.remaining_attempts(), 5);
    }

    #[test]
    fn mnemonic_accessible_while_unlocked() {
        let manager = SessionManager::with_defaults();
        manager.unlock(unlocked()).unwrap();
        let phrase = manager
            .with_mnemonic(|metadata, phrase| {
                assert_eq!(metadata.identity_name, "Session Test");
                Ok(phrase.to_string())
            })
            .unwrap();
        assert_eq!(phrase, TEST_PHRASE);
    }
}
