//! Application configuration loaded from environment variables.

use crate::errors::{ControllerError, Result};
use crate::ledger::Address;

#[derive(Debug, Clone)]
pub struct Config {
    /// AidChain ledger RPC endpoint (e.g. https://rpc.sepolia.example.org)
    pub rpc_url: String,
    /// Optional confidential-path RPC endpoint; donations flagged
    /// `confidential` are submitted here instead of `rpc_url`.
    pub confidential_rpc_url: Option<String>,
    /// The AidChain contract address
    pub contract_address: Address,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the background task refreshes the snapshot
    pub refresh_interval_secs: u64,
    /// Bounded wait (in milliseconds) for each individual ledger read
    pub read_timeout_ms: u64,
    /// Comma-separated admin allow-list for the authorization policy
    pub admin_wallets: Vec<Address>,
    /// Upstream generative-AI endpoint for the chatbot relay (optional)
    pub chatbot_upstream_url: Option<String>,
    /// API key for the chatbot upstream (optional)
    pub chatbot_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://localhost:8545".to_string()),
            confidential_rpc_url: env_var("CONFIDENTIAL_RPC_URL").ok(),
            contract_address: env_var("CONTRACT_ADDRESS")
                .map_err(|_| {
                    ControllerError::Config(
                        "CONTRACT_ADDRESS environment variable is required".to_string(),
                    )
                })?
                .parse()
                .map_err(|_| ControllerError::Config("Invalid CONTRACT_ADDRESS".to_string()))?,
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ControllerError::Config("Invalid API_PORT".to_string()))?,
            refresh_interval_secs: env_var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| {
                    ControllerError::Config("Invalid REFRESH_INTERVAL_SECS".to_string())
                })?,
            read_timeout_ms: env_var("READ_TIMEOUT_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| ControllerError::Config("Invalid READ_TIMEOUT_MS".to_string()))?,
            admin_wallets: parse_admin_list(&env_var("ADMIN_WALLETS").unwrap_or_default())?,
            chatbot_upstream_url: env_var("CHATBOT_UPSTREAM_URL").ok(),
            chatbot_api_key: env_var("CHATBOT_API_KEY").ok(),
        })
    }
}

/// Parse a comma-separated list of hex addresses, skipping empty entries.
fn parse_admin_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ControllerError::Config(format!("Invalid admin address: {s}")))
        })
        .collect()
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ControllerError::Config(format!("Missing env var: {key}")))
}
