//! Axum REST API handlers.
//!
//! State-changing routes all run the same path: fresh caller-scoped
//! refresh → guard → submit.  A guard rejection answers `409` with the
//! structured rejection body; a ledger refusal answers `502` and is never
//! retried here — the client must refresh and re-evaluate.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::aggregator;
use crate::auth::AllowList;
use crate::errors::ControllerError;
use crate::guard::OperationGuard;
use crate::ledger::{Address, Amount, LedgerGateway, Operation};
use crate::rpc::JsonRpcGateway;
use crate::snapshot::{AidRequestRecord, Fetched, SnapshotStore};

pub struct AppState {
    pub gateway: Arc<JsonRpcGateway>,
    pub store: Arc<SnapshotStore>,
    pub guard: OperationGuard<AllowList>,
    pub read_timeout: Duration,
    pub http: Client,
    pub chatbot_upstream_url: Option<String>,
    pub chatbot_api_key: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct RequestsResponse {
    pub count: usize,
    pub partial: bool,
    pub requests: Vec<AidRequestRecord>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(serde_json::json!(ErrorResponse { error }))).into_response()
}

// ─────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
pub struct StateQuery {
    pub caller: Option<Address>,
}

/// `GET /state?caller=0x…`
///
/// Runs a caller-scoped refresh and returns the fresh snapshot (which is
/// also published as the latest).
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StateQuery>,
) -> impl IntoResponse {
    let snapshot =
        aggregator::refresh(&state.gateway, query.caller, state.read_timeout).await;
    let snapshot = state.store.publish(snapshot).await;
    Json((*snapshot).clone())
}

/// `GET /requests`
///
/// The current-cycle request list from the latest published snapshot.
pub async fn get_requests(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.latest().await;
    match &snapshot.requests {
        Fetched::Known(requests) => Json(serde_json::json!(RequestsResponse {
            count: requests.len(),
            partial: snapshot.partial,
            requests: requests.clone(),
        }))
        .into_response(),
        Fetched::Unknown => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "request list is currently unreadable".to_string(),
        ),
    }
}

/// `GET /requests/:address`
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(address): Path<Address>,
) -> impl IntoResponse {
    let snapshot = state.store.latest().await;
    match snapshot.request(address) {
        Some(record) => Json(record.clone()).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no current-cycle request for {address}"),
        ),
    }
}

// ─────────────────────────────────────────────────────────
// Operation handlers
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DonateBody {
    pub donor: Address,
    pub amount: Amount,
    pub recipient: Option<Address>,
    #[serde(default)]
    pub confidential: bool,
}

#[derive(Deserialize)]
pub struct ApplyBody {
    pub caller: Address,
    pub reason: String,
    pub location: String,
    pub name: String,
    pub contact: String,
}

#[derive(Deserialize)]
pub struct RecipientBody {
    pub caller: Address,
    pub recipient: Address,
}

#[derive(Deserialize)]
pub struct CallerBody {
    pub caller: Address,
}

#[derive(Deserialize)]
pub struct MintDonorBody {
    pub caller: Address,
    /// Defaults to the caller; minting is self-service either way.
    pub holder: Option<Address>,
}

/// `POST /operations/donate`
pub async fn donate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DonateBody>,
) -> Response {
    let op = Operation::Donate {
        amount: body.amount,
        recipient: body.recipient,
        confidential: body.confidential,
    };
    execute(&state, body.donor, op).await
}

/// `POST /operations/apply`
pub async fn apply_for_aid(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApplyBody>,
) -> Response {
    let op = Operation::ApplyForAid {
        reason: body.reason,
        location: body.location,
        name: body.name,
        contact: body.contact,
    };
    execute(&state, body.caller, op).await
}

/// `POST /operations/approve`
pub async fn approve_recipient(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecipientBody>,
) -> Response {
    execute(&state, body.caller, Operation::ApproveRecipient { recipient: body.recipient }).await
}

/// `POST /operations/reject`
pub async fn reject_recipient(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecipientBody>,
) -> Response {
    execute(&state, body.caller, Operation::RejectRecipient { recipient: body.recipient }).await
}

/// `POST /operations/claim`
pub async fn claim_aid(State(state): State<Arc<AppState>>, Json(body): Json<CallerBody>) -> Response {
    execute(&state, body.caller, Operation::ClaimAid).await
}

/// `POST /operations/reset`
pub async fn reset_cycle(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CallerBody>,
) -> Response {
    execute(&state, body.caller, Operation::ResetCycle).await
}

/// `POST /operations/mint-donor`
pub async fn mint_donor_nft(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MintDonorBody>,
) -> Response {
    let holder = body.holder.unwrap_or(body.caller);
    execute(&state, body.caller, Operation::MintDonorNft { holder }).await
}

/// `POST /operations/mint-recipient`
pub async fn mint_recipient_nft(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecipientBody>,
) -> Response {
    execute(&state, body.caller, Operation::MintRecipientNft { recipient: body.recipient }).await
}

/// Refresh → guard → submit → refresh.
async fn execute(state: &AppState, caller: Address, op: Operation) -> Response {
    let snapshot = aggregator::refresh(&state.gateway, Some(caller), state.read_timeout).await;
    let snapshot = state.store.publish(snapshot).await;

    if let Err(rejection) = state.guard.check(&snapshot, caller, &op) {
        return (StatusCode::CONFLICT, Json(serde_json::json!(rejection))).into_response();
    }

    match state.gateway.submit(&op, caller).await {
        Ok(receipt) => {
            // Reflect the accepted operation before answering.
            let fresh =
                aggregator::refresh(&state.gateway, Some(caller), state.read_timeout).await;
            state.store.publish(fresh).await;
            Json(receipt).into_response()
        }
        Err(refusal @ ControllerError::LedgerRejected { .. }) => {
            error_response(StatusCode::BAD_GATEWAY, refusal.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
