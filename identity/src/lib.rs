// lib.rs - Core library structure for the identity subsystem

pub mod config_store;
pub mod context;
pub mod errors;
pub mod keys;
pub mod ledger;
pub mod mnemonic;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod validation;
pub mod verifier;

// Re-export common types
pub use config_store::{
    ConfigStore, IdentityConfig, LedgerConfig, SessionConfig, VerifyConfig,
};
pub use context::{IdentityContext, SharedIdentityContext};
pub use errors::{IdentityError, IdentityResult};
pub use keys::{Address, IdentityKeyPair};
pub use ledger::{LedgerClient, LedgerEntry, SubmitOutcome};
pub use session::SessionManager;
pub use storage::{
    IdentityPaths, VaultCreateParams, VaultManager, VaultMetadata, VaultSecrets, VaultUnlocked,
};
pub use transaction::{TxStatus, UbtTransaction};
pub use validation::InputValidator;
pub use verifier::{MemoryReplayGuard, ReplayGuard, TransactionVerifier, Verified};
