//! Chatbot relay — forwards user messages to an upstream generative-AI
//! API and serves a static fallback reply when the upstream is down.
//!
//! Deliberately outside the cycle core: transport failures here never
//! touch ledger state and are absorbed entirely by the fallback.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;

/// Served whenever the upstream fails or returns nothing usable.
const FALLBACK_REPLY: &str =
    "I can help with donations, aid applications, claiming approved aid, and badge minting. \
     Connect a wallet to get started.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamReply {
    text: Option<String>,
}

/// `POST /api/chatbot`
pub async fn chatbot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let message = match body.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!(ChatError {
                    error: "Invalid or empty message provided.".to_string()
                })),
            )
                .into_response();
        }
    };

    let response = match &state.chatbot_upstream_url {
        Some(url) => ask_upstream(&state.http, url, state.chatbot_api_key.as_deref(), &message)
            .await
            .unwrap_or_else(|e| {
                warn!("chatbot upstream failed, serving fallback: {e}");
                FALLBACK_REPLY.to_string()
            }),
        None => FALLBACK_REPLY.to_string(),
    };

    Json(serde_json::json!(ChatReply { response })).into_response()
}

async fn ask_upstream(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    message: &str,
) -> crate::errors::Result<String> {
    let mut request = client.post(url).json(&serde_json::json!({ "prompt": message }));
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let reply: UpstreamReply = request.send().await?.error_for_status()?.json().await?;

    reply
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| crate::errors::ControllerError::Malformed("empty upstream reply".to_string()))
}
