//! Application-wide error types.
//!
//! Expected business conditions (a guard turning an operation away, a read
//! degrading to `Unknown`) are *values*, not errors — see `guard.rs` and
//! `snapshot.rs`.  This enum covers unexpected faults plus the one
//! ledger-originated refusal the caller must surface: `LedgerRejected`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The ledger itself refused a state-changing operation.  Never retried
    /// automatically; the caller must re-refresh and re-evaluate first.
    #[error("ledger rejected {method}: {message} (code {code})")]
    LedgerRejected {
        method: &'static str,
        code: i64,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ControllerError>;
