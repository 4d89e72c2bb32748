//! AidChain Cycle Controller — entry point.
//!
//! Maintains a read-model over the AidChain ledger contract: a background
//! task re-polls the ledger and publishes immutable `ContractState`
//! snapshots, while an Axum REST API serves the snapshot and guards every
//! state-changing operation with local precondition checks before
//! submitting it through the ledger gateway.

mod aggregator;
mod api;
mod auth;
mod config;
mod cycle;
mod errors;
mod guard;
mod ledger;
mod refresher;
mod relay;
mod rpc;
mod snapshot;

#[cfg(test)]
mod test_cycle_flow;
#[cfg(test)]
mod testledger;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::AllowList;
use config::Config;
use guard::OperationGuard;
use rpc::JsonRpcGateway;
use snapshot::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // HTTP client shared by the ledger gateway and the chatbot relay.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let gateway = Arc::new(JsonRpcGateway::new(client.clone(), &config));
    let store = Arc::new(SnapshotStore::new());
    let shutdown = CancellationToken::new();

    // ─── Background refresher ─────────────────────────────
    tokio::spawn(refresher::run(refresher::RefresherState {
        gateway: Arc::clone(&gateway),
        store: Arc::clone(&store),
        interval: Duration::from_secs(config.refresh_interval_secs),
        read_timeout: Duration::from_millis(config.read_timeout_ms),
        shutdown: shutdown.clone(),
    }));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::AppState {
        gateway,
        store,
        guard: OperationGuard::new(AllowList::new(config.admin_wallets.clone())),
        read_timeout: Duration::from_millis(config.read_timeout_ms),
        http: client,
        chatbot_upstream_url: config.chatbot_upstream_url.clone(),
        chatbot_api_key: config.chatbot_api_key.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/state", get(api::get_state))
        .route("/requests", get(api::get_requests))
        .route("/requests/:address", get(api::get_request))
        .route("/operations/donate", post(api::donate))
        .route("/operations/apply", post(api::apply_for_aid))
        .route("/operations/approve", post(api::approve_recipient))
        .route("/operations/reject", post(api::reject_recipient))
        .route("/operations/claim", post(api::claim_aid))
        .route("/operations/reset", post(api::reset_cycle))
        .route("/operations/mint-donor", post(api::mint_donor_nft))
        .route("/operations/mint-recipient", post(api::mint_recipient_nft))
        .route("/api/chatbot", post(relay::chatbot))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
