//! JSON-RPC ledger gateway — application-level calls against the AidChain
//! contract node.
//!
//! ## Resilience
//!
//! * Reads retry on transient failures (connection errors, rate limits,
//!   soft RPC errors) with exponential back-off, bounded at
//!   [`MAX_READ_ATTEMPTS`] — the aggregator's per-read timeout is the outer
//!   bound either way.
//! * Submissions are strictly single-shot.  A refused state-changing
//!   operation is surfaced as `LedgerRejected` and never replayed: the
//!   snapshot that justified it may be stale, and blind retry risks
//!   duplicate effects.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Config;
use crate::errors::{ControllerError, Result};
use crate::ledger::{
    Address, AidRequestDetail, Amount, Donation, LedgerGateway, Operation, Receipt,
};

const MAX_READ_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

// ─────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────

pub struct JsonRpcGateway {
    client: Client,
    rpc_url: String,
    confidential_rpc_url: Option<String>,
    contract: Address,
}

impl JsonRpcGateway {
    pub fn new(client: Client, config: &Config) -> Self {
        JsonRpcGateway {
            client,
            rpc_url: config.rpc_url.clone(),
            confidential_rpc_url: config.confidential_rpc_url.clone(),
            contract: config.contract_address,
        }
    }

    /// One JSON-RPC call, no retries.
    async fn call(&self, url: &str, method: &str, mut params: Value) -> Result<Value> {
        params["contract"] = json!(self.contract);

        let response = self
            .client
            .post(url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ControllerError::Rpc {
                code: 429,
                message: "rate-limited".to_string(),
            });
        }

        let body: RpcResponse = response.json().await?;

        if let Some(err) = body.error {
            return Err(ControllerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        body.result.ok_or_else(|| {
            ControllerError::Malformed(format!("empty result from {method}"))
        })
    }

    /// A read with bounded back-off on transient failures.
    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T> {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            match self.call(&self.rpc_url, method, params.clone()).await {
                Ok(value) => return Ok(serde_json::from_value(value)?),
                Err(e) if attempt < MAX_READ_ATTEMPTS && is_transient(&e) => {
                    warn!("read {method} failed (attempt {attempt}, retrying in {backoff}ms): {e}");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Hard RPC errors (malformed request, unknown method, bad params) will not
/// get better on retry; everything else is worth another attempt.
fn is_transient(error: &ControllerError) -> bool {
    match error {
        ControllerError::Http(_) => true,
        ControllerError::Rpc { code, .. } => !matches!(code, -32600 | -32601 | -32602),
        _ => false,
    }
}

/// Encode an operation's arguments for submission.
fn op_params(op: &Operation) -> Value {
    match op {
        Operation::Donate { amount, recipient, .. } => {
            json!({ "amount": amount, "recipient": recipient })
        }
        Operation::ApplyForAid { reason, location, name, contact } => {
            json!({ "reason": reason, "location": location, "name": name, "contact": contact })
        }
        Operation::ApproveRecipient { recipient } | Operation::MintRecipientNft { recipient } => {
            json!({ "recipient": recipient })
        }
        Operation::RejectRecipient { recipient } => json!({ "recipient": recipient }),
        Operation::MintDonorNft { holder } => json!({ "holder": holder }),
        Operation::ClaimAid | Operation::ResetCycle => json!({}),
    }
}

impl LedgerGateway for JsonRpcGateway {
    async fn total_donated(&self) -> Result<Amount> {
        self.read("totalDonated", json!({})).await
    }

    async fn donations(&self) -> Result<Vec<Donation>> {
        self.read("getDonations", json!({})).await
    }

    async fn aid_request_list(&self) -> Result<Vec<Address>> {
        self.read("getAidRequests", json!({})).await
    }

    async fn aid_request(&self, addr: Address) -> Result<Option<AidRequestDetail>> {
        let detail: AidRequestDetail =
            self.read("aidRequests", json!({ "address": addr })).await?;
        // The contract returns a zeroed struct for unknown addresses.
        Ok((!detail.recipient.is_zero()).then_some(detail))
    }

    async fn is_approved(&self, addr: Address) -> Result<bool> {
        self.read("approvedRecipients", json!({ "address": addr })).await
    }

    async fn has_claimed(&self, addr: Address) -> Result<bool> {
        self.read("hasClaimedAid", json!({ "address": addr })).await
    }

    async fn has_donated(&self, addr: Address) -> Result<bool> {
        self.read("hasDonated", json!({ "address": addr })).await
    }

    async fn has_donor_badge(&self, addr: Address) -> Result<bool> {
        self.read("hasDonorBadge", json!({ "address": addr })).await
    }

    async fn has_recipient_badge(&self, addr: Address) -> Result<bool> {
        self.read("hasRecipientBadge", json!({ "address": addr })).await
    }

    async fn aid_amount(&self) -> Result<Amount> {
        self.read("AID_AMOUNT", json!({})).await
    }

    async fn active_recipient(&self) -> Result<Option<Address>> {
        let addr: Address = self.read("activeRecipient", json!({})).await?;
        Ok((!addr.is_zero()).then_some(addr))
    }

    async fn submit(&self, op: &Operation, signer: Address) -> Result<Receipt> {
        // Confidential donations go out through the privacy-preserving
        // endpoint; semantics are identical, only observability differs.
        let url = match op {
            Operation::Donate { confidential: true, .. } => {
                self.confidential_rpc_url.as_deref().ok_or_else(|| {
                    ControllerError::Config(
                        "confidential donation requested but CONFIDENTIAL_RPC_URL is not set"
                            .to_string(),
                    )
                })?
            }
            _ => self.rpc_url.as_str(),
        };

        let mut params = op_params(op);
        params["signer"] = json!(signer);

        match self.call(url, op.method(), params).await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(ControllerError::Rpc { code, message }) => Err(ControllerError::LedgerRejected {
                method: op.method(),
                code,
                message,
            }),
            Err(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
