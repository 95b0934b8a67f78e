//! UBT transfer records: canonical encoding, content hash, and signing.
//!
//! The canonical byte layout is the contract every signature depends on.
//! Field order and widths are fixed forever; a new layout means a new
//! version byte, never a change to this one, or historical signatures stop
//! verifying.

use chrono::Utc;
use ed25519_dalek::Signer;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::{IdentityError, IdentityResult};
use crate::keys::Address;
use crate::session::SessionManager;

const CANONICAL_DOMAIN: &[u8; 5] = b"UBTTX";
const CANONICAL_VERSION: u8 = 1;

/// Random per-transaction nonce length in bytes.
pub const TX_NONCE_LEN: usize = 16;

/// Canonical encoding length: domain ‖ version ‖ sender ‖ receiver ‖
/// amount ‖ timestamp ‖ nonce.
pub const CANONICAL_LEN: usize = 5 + 1 + 32 + 32 + 8 + 8 + TX_NONCE_LEN;

/// Lifecycle status of a transfer. Not covered by the hash or signature;
/// everything that is signed lives in the canonical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A signed UBT transfer. Immutable once signed: changing any canonical
/// field invalidates the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UbtTransaction {
    pub id: Uuid,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    /// Unix timestamp (seconds) stamped by the sender at signing time.
    pub timestamp: i64,
    #[serde(with = "hex::serde")]
    pub nonce: [u8; TX_NONCE_LEN],
    /// SHA-256 digest of the canonical encoding.
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
    /// Ed25519 signature over `hash` by the sender's key.
    #[serde(with = "hex::serde")]
    pub signature: [u8; 64],
    pub status: TxStatus,
}

impl UbtTransaction {
    /// Recompute the canonical hash from this transaction's own fields.
    pub fn canonical_hash(&self) -> [u8; 32] {
        hash(&canonical_encode(
            &self.sender,
            &self.receiver,
            self.amount,
            self.timestamp,
            &self.nonce,
        ))
    }
}

/// Produce the fixed-order, fixed-width byte encoding of a transfer intent.
///
/// Deterministic: identical fields always yield identical bytes.
pub fn canonical_encode(
    sender: &Address,
    receiver: &Address,
    amount: u64,
    timestamp: i64,
    nonce: &[u8; TX_NONCE_LEN],
) -> [u8; CANONICAL_LEN] {
    let mut out = [0u8; CANONICAL_LEN];
    let mut offset = 0;

    out[offset..offset + 5].copy_from_slice(CANONICAL_DOMAIN);
    offset += 5;
    out[offset] = CANONICAL_VERSION;
    offset += 1;
    out[offset..offset + 32].copy_from_slice(sender.as_bytes());
    offset += 32;
    out[offset..offset + 32].copy_from_slice(receiver.as_bytes());
    offset += 32;
    out[offset..offset + 8].copy_from_slice(&amount.to_be_bytes());
    offset += 8;
    out[offset..offset + 8].copy_from_slice(&timestamp.to_be_bytes());
    offset += 8;
    out[offset..].copy_from_slice(nonce);

    out
}

/// SHA-256 content digest of a canonical encoding.
pub fn hash(canonical: &[u8; CANONICAL_LEN]) -> [u8; 32] {
    let digest = Sha256::digest(canonical);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Sign a transfer intent with the session's key, producing a pending
/// `UbtTransaction`.
///
/// Requires an unlocked session. The nonce is drawn fresh from the OS RNG on
/// every call, so two concurrent signs can never collide; it is never a
/// counter (a counter would leak transaction ordering).
pub fn sign_transfer(
    session: &SessionManager,
    receiver: Address,
    amount: u64,
) -> IdentityResult<UbtTransaction> {
    if amount == 0 {
        return Err(IdentityError::InvalidAmount(
            "Transfer amount must be positive".to_string(),
        ));
    }

    session.with_signing_key(|signing_key, sender| {
        if sender == receiver {
            return Err(IdentityError::SameParty);
        }

        let mut nonce = [0u8; TX_NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| IdentityError::CryptoError(format!("Failed to draw nonce: {}", e)))?;

        let timestamp = Utc::now().timestamp();
        let canonical = canonical_encode(&sender, &receiver, amount, timestamp, &nonce);
        let tx_hash = hash(&canonical);
        let signature = signing_key.sign(&tx_hash);

        Ok(UbtTransaction {
            id: Uuid::new_v4(),
            sender,
            receiver,
            amount,
            timestamp,
            nonce,
            hash: tx_hash,
            signature: signature.to_bytes(),
            status: TxStatus::Pending,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{VaultMetadata, VaultSecrets, VaultUnlocked};

    const SENDER_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn unlocked_session() -> SessionManager {
        let manager = SessionManager::with_defaults();
        manager
            .unlock(VaultUnlocked {
                metadata: VaultMetadata::new("Codec Test"),
                secrets: VaultSecrets::new(SENDER_PHRASE),
            })
            .unwrap();
        manager
    }

    fn other_address() -> Address {
        let seed = crate::mnemonic::to_seed(SENDER_PHRASE, "receiver").unwrap();
        crate::keys::IdentityKeyPair::from_seed(&seed).address()
    }

    #[test]
    fn canonical_encoding_is_deterministic() {
        let sender = Address::from_bytes([1u8; 32]);
        let receiver = Address::from_bytes([2u8; 32]);
        let nonce = [7u8; TX_NONCE_LEN];

        let a = canonical_encode(&sender, &receiver, 100, 1_700_000_000, &nonce);
        let b = canonical_encode(&sender, &receiver, 100, 1_700_000_000, &nonce);
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_eq!(a.len(), CANONICAL_LEN);
        assert_eq!(&a[..5], CANONICAL_DOMAIN);
    }

    #[test]
    fn each_field_changes_the_encoding() {
        let sender = Address::from_bytes([1u8; 32]);
        let receiver = Address::from_bytes([2u8; 32]);
        let nonce = [7u8; TX_NONCE_LEN];
        let base = canonical_encode(&sender, &receiver, 100, 1_700_000_000, &nonce);

        let variants = [
            canonical_encode(&receiver, &sender, 100, 1_700_000_000, &nonce),
            canonical_encode(&sender, &receiver, 101, 1_700_000_000, &nonce),
            canonical_encode(&sender, &receiver, 100, 1_700_000_001, &nonce),
            canonical_encode(&sender, &receiver, 100, 1_700_000_000, &[8u8; TX_NONCE_LEN]),
        ];
        for variant in variants {
            assert_ne!(hash(&base), hash(&variant));
        }
    }

    #[test]
    fn sign_transfer_produces_pending_verifiable_tx() {
        let session = unlocked_session();
        let receiver = other_address();

        let tx = sign_transfer(&session, receiver, 42).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.amount, 42);
        assert_eq!(tx.receiver, receiver);
        assert_eq!(tx.sender, session.public_key().unwrap());
        assert_eq!(tx.hash, tx.canonical_hash());

        let key = tx.sender.verifying_key().unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&tx.signature);
        assert!(key.verify_strict(&tx.hash, &signature).is_ok());
    }

    #[test]
    fn nonces_are_unique_per_sign() {
        let session = unlocked_session();
        let receiver = other_address();

        let a = sign_transfer(&session, receiver, 1).unwrap();
        let b = sign_transfer(&session, receiver, 1).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn zero_amount_rejected() {
        let session = unlocked_session();
        let err = sign_transfer(&session, other_address(), 0).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidAmount(_)));
    }

    #[test]
    fn self_transfer_rejected() {
        let session = unlocked_session();
        let own = session.public_key().unwrap();
        assert_eq!(
            sign_transfer(&session, own, 10).unwrap_err(),
            IdentityError::SameParty
        );
    }

    #[test]
    fn locked_session_cannot_sign() {
        let session = unlocked_session();
        session.lock();
        assert_eq!(
            sign_transfer(&session, other_address(), 10).unwrap_err(),
            IdentityError::NotUnlocked
        );
    }

    #[test]
    fn transaction_serializes_with_hex_fields() {
        let session = unlocked_session();
        let tx = sign_transfer(&session, other_address(), 5).unwrap();

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["hash"].as_str().unwrap().len(), 64);
        assert_eq!(json["signature"].as_str().unwrap().len(), 128);
        assert_eq!(json["nonce"].as_str().unwrap().len(), TX_NONCE_LEN * 2);
        assert_eq!(json["status"], "pending");

        let back: UbtTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
