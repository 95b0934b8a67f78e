//! Transaction verification: tamper, signature, replay, and freshness checks.
//!
//! Verification is a pure query so any auditor can re-run it over ledger
//! entries. Recording an accepted hash into the replay guard is a separate,
//! explicit step owned by whoever appends to the ledger.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ed25519_dalek::{Signature, VerifyingKey};
use parking_lot::RwLock;

use crate::errors::{IdentityError, IdentityResult};
use crate::transaction::UbtTransaction;

/// Default window around the verifier's clock within which a transaction
/// timestamp is considered fresh. Policy value; override via constructor.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Marker returned on successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified;

/// Tracks transaction hashes that have already been accepted.
pub trait ReplayGuard: Send + Sync {
    /// Whether this exact transaction hash was accepted before.
    fn seen(&self, hash: &[u8; 32]) -> bool;

    /// Record a hash as accepted. Returns false if it was already present.
    fn record(&self, hash: [u8; 32]) -> bool;
}

/// In-process replay guard backed by a hash set. Suitable for a single
/// verifier instance; a ledger-backed guard implements the same trait.
#[derive(Debug, Default)]
pub struct MemoryReplayGuard {
    seen: RwLock<HashSet<[u8; 32]>>,
}

impl MemoryReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayGuard for MemoryReplayGuard {
    fn seen(&self, hash: &[u8; 32]) -> bool {
        self.seen.read().contains(hash)
    }

    fn record(&self, hash: [u8; 32]) -> bool {
        self.seen.write().insert(hash)
    }
}

/// Verifies signed transfers against a claimed sender key, a replay guard,
/// and a clock-skew bound.
#[derive(Clone)]
pub struct TransactionVerifier {
    guard: Arc<dyn ReplayGuard>,
    max_skew: Duration,
}

impl TransactionVerifier {
    pub fn new(guard: Arc<dyn ReplayGuard>, max_skew: Duration) -> Self {
        Self { guard, max_skew }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(MemoryReplayGuard::new()), DEFAULT_CLOCK_SKEW)
    }

    /// Verify a transaction against the claimed sender public key.
    ///
    /// Checks, in order: canonical hash (tamper), signature, replay,
    /// timestamp freshness. No side effects on success; call
    /// [`record_accepted`](Self::record_accepted) once the ledger appends it.
    pub fn verify(
        &self,
        tx: &UbtTransaction,
        claimed_sender: &VerifyingKey,
    ) -> IdentityResult<Verified> {
        self.verify_at(tx, claimed_sender, Utc::now().timestamp())
    }

    /// Like [`verify`](Self::verify) with an explicit reference clock.
    pub fn verify_at(
        &self,
        tx: &UbtTransaction,
        claimed_sender: &VerifyingKey,
        now_unix: i64,
    ) -> IdentityResult<Verified> {
        if tx.canonical_hash() != tx.hash {
            return Err(IdentityError::HashMismatch);
        }

        let signature = Signature::from_bytes(&tx.signature);
        claimed_sender
            .verify_strict(&tx.hash, &signature)
            .map_err(|_| IdentityError::BadSignature)?;

        if self.guard.seen(&tx.hash) {
            return Err(IdentityError::Replay);
        }

        let skew = now_unix.abs_diff(tx.timestamp);
        if skew > self.max_skew.as_secs() {
            return Err(IdentityError::StaleTimestamp);
        }

        Ok(Verified)
    }

    /// Record a transaction hash as accepted so later resubmissions are
    /// rejected as replays. Returns false if it was already recorded.
    pub fn record_accepted(&self, tx: &UbtTransaction) -> bool {
        self.guard.record(tx.hash)
    }
}
