//! Client for the external ledger index: the single authoritative
//! append-only log of accepted transfers.
//!
//! This core is a client of the ledger, not its keeper. A valid submission
//! is a `UbtTransaction` that passes verification; the ledger answers with
//! accept/reject and surfaces the verifier's rejection reason verbatim.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{IdentityError, IdentityResult};
use crate::keys::Address;
use crate::transaction::{TxStatus, UbtTransaction, TX_NONCE_LEN};

/// A transaction as recorded by the ledger, keyed by hash. Append-only:
/// once written, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub timestamp: i64,
    #[serde(with = "hex::serde")]
    pub nonce: [u8; TX_NONCE_LEN],
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
    #[serde(with = "hex::serde")]
    pub signature: [u8; 64],
    /// Unix timestamp at which the ledger accepted the entry.
    pub recorded_at: i64,
}

impl LedgerEntry {
    /// Reconstruct the transaction this entry records, for independent
    /// re-verification by any auditor.
    pub fn to_transaction(&self) -> UbtTransaction {
        UbtTransaction {
            id: self.id,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            timestamp: self.timestamp,
            nonce: self.nonce,
            hash: self.hash,
            signature: self.signature,
            status: TxStatus::Accepted,
        }
    }
}

/// Outcome of submitting a transaction to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected { reason: String },
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryByHashResponse {
    entry: Option<LedgerEntry>,
}

#[derive(Debug, Deserialize)]
struct QueryByAddressResponse {
    entries: Vec<LedgerEntry>,
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: String,
    method: String,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // fields are populated via serde; not all are read by all call sites
struct JsonRpcResponse<T> {
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    id: u64,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// HTTP client for ledger RPC communication.
pub struct LedgerClient {
    client: Client,
    base_url: String,
}

impl LedgerClient {
    /// Create a new ledger client.
    pub fn new(base_url: String) -> IdentityResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                IdentityError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(LedgerClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit a signed transaction for acceptance.
    pub async fn submit(&self, tx: &UbtTransaction) -> IdentityResult<SubmitOutcome> {
        let params = serde_json::json!({ "transaction": tx });
        let response: SubmitResponse = self.rpc_call("ubt_submit_transaction", params).await?;

        if response.accepted {
            Ok(SubmitOutcome::Accepted)
        } else {
            Ok(SubmitOutcome::Rejected {
                reason: response
                    .reason
                    .unwrap_or_else(|| "Rejected without reason".to_string()),
            })
        }
    }

    /// Look up a single ledger entry by transaction hash.
    pub async fn query_by_hash(&self, hash: &[u8; 32]) -> IdentityResult<Option<LedgerEntry>> {
        let params = serde_json::json!({ "hash": hex::encode(hash) });
        let response: QueryByHashResponse = self.rpc_call("ubt_get_entry", params).await?;
        Ok(response.entry)
    }

    /// List ledger entries where the address appears as sender or receiver,
    /// newest first. Balance and history presentation belong to the caller.
    pub async fn query_by_address(
        &self,
        address: &Address,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> IdentityResult<Vec<LedgerEntry>> {
        let params = serde_json::json!({
            "address": address.to_string(),
            "limit": limit,
            "offset": offset
        });
        let response: QueryByAddressResponse =
            self.rpc_call("ubt_get_entries_by_address", params).await?;
        Ok(response.entries)
    }

    /// Make a JSON-RPC call to the ledger node.
    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> IdentityResult<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let url = format!("{}/jsonrpc", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IdentityError::NetworkError(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IdentityError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            IdentityError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        if let Some(error) = rpc_response.error {
            return Err(IdentityError::NetworkError(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| IdentityError::InvalidResponse("No result in RPC response".to_string()))
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires running ledger RPC server at localhost:8545"]
    async fn query_by_address_against_live_node() {
        let client = LedgerClient::new("http://localhost:8545".to_string()).unwrap();
        let address = Address::from_bytes([0u8; 32]);
        let result = client.query_by_address(&address, Some(10), None).await;
        assert!(result.is_ok(), "Address query should succeed");
    }
}
