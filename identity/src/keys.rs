//! Deterministic Ed25519 key derivation and the public address encoding.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::{IdentityError, IdentityResult};
use crate::mnemonic::SEED_LEN;

/// Length of an encoded address (32 public key bytes, hex).
pub const ADDRESS_HEX_LEN: usize = 64;

/// An identity's public address: the raw Ed25519 public key, displayed as hex.
///
/// Used for wallet display, QR embedding, and as the ledger addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Recover the verifying key behind this address.
    pub fn verifying_key(&self) -> IdentityResult<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| IdentityError::InvalidAddress("Not a valid Ed25519 point".to_string()))
    }
}

impl From<&VerifyingKey> for Address {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ADDRESS_HEX_LEN {
            return Err(IdentityError::InvalidAddress(format!(
                "Expected {} hex characters, got {}",
                ADDRESS_HEX_LEN,
                s.len()
            )));
        }
        let bytes: [u8; 32] = hex::decode(s)
            .map_err(|e| IdentityError::InvalidAddress(e.to_string()))?
            .try_into()
            .map_err(|_| IdentityError::InvalidAddress("Wrong byte length".to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A signing keypair derived from an identity seed.
///
/// Never serialized; lives only inside an unlocked session.
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl IdentityKeyPair {
    /// Derive the keypair from a 64-byte identity seed.
    ///
    /// The first 32 seed bytes are the Ed25519 signing seed; the rest is
    /// reserved. Identical seed always yields the identical keypair, which
    /// recovery depends on. Pure function, no I/O.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        let mut signing_seed = [0u8; 32];
        signing_seed.copy_from_slice(&seed[..32]);
        // SigningKey zeroizes its seed copy on drop (dalek zeroize support).
        let signing_key = SigningKey::from_bytes(&signing_seed);
        signing_seed.iter_mut().for_each(|b| *b = 0);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn address(&self) -> Address {
        Address::from(&self.verifying_key)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
