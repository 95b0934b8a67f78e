use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdentityError {
    // Mnemonic / key errors
    InvalidMnemonic(String),
    CryptoError(String),

    // Vault errors
    WrongPinOrCorrupt,
    VaultNotFound,
    AlreadyExists(String),

    // Session errors
    NotUnlocked,
    PermissionDenied(String),

    // Transaction intent errors
    InvalidAmount(String),
    SameParty,

    // Verification errors
    HashMismatch,
    BadSignature,
    Replay,
    StaleTimestamp,

    // Storage errors
    StorageError(String),
    FileNotFound(String),

    // Ledger client errors
    NetworkError(String),
    InvalidResponse(String),

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),

    // Generic errors
    Unknown(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdentityError::InvalidMnemonic(msg) => write!(f, "Invalid mnemonic: {}", msg),
            IdentityError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),

            IdentityError::WrongPinOrCorrupt => write!(f, "Incorrect PIN or corrupted vault"),
            IdentityError::VaultNotFound => write!(f, "No identity vault on this device"),
            IdentityError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),

            IdentityError::NotUnlocked => write!(f, "Identity session is locked"),
            IdentityError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),

            IdentityError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            IdentityError::SameParty => write!(f, "Sender and receiver must differ"),

            IdentityError::HashMismatch => write!(f, "Transaction hash does not match contents"),
            IdentityError::BadSignature => write!(f, "Transaction signature is invalid"),
            IdentityError::Replay => write!(f, "Transaction was already accepted"),
            IdentityError::StaleTimestamp => {
                write!(f, "Transaction timestamp is outside the accepted window")
            }

            IdentityError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            IdentityError::FileNotFound(msg) => write!(f, "File not found: {}", msg),

            IdentityError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            IdentityError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),

            IdentityError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            IdentityError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),

            IdentityError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for IdentityError {}

pub type IdentityResult<T> = Result<T, IdentityError>;

// Conversion helpers
impl From<std::io::Error> for IdentityError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => IdentityError::FileNotFound(error.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                IdentityError::PermissionDenied(error.to_string())
            }
            _ => IdentityError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(error: serde_json::Error) -> Self {
        IdentityError::ValidationError(format!("JSON error: {}", error))
    }
}
