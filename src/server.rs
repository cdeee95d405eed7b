use crate::client::{ChatMessage, CompletionClient};
use crate::config::{Config, EnvelopeStyle};
use crate::error::RelayError;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant.";

const INDEX_FALLBACK: &str = "<h1>AI Chat Interface</h1>\
<p>Static files not found. Use /responses endpoint for API access.</p>";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Arc<dyn CompletionClient>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/responses", post(responses_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The prompt relay endpoint. One upstream round trip per request, no
/// retries and no caching.
async fn responses_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    info!("Processing chat request");
    let debug_errors = state.config.relay.debug_errors;

    let ask = match parse_ask(&body) {
        Ok(ask) => ask,
        Err(e) => {
            warn!("Rejected chat request: {}", e);
            return Err((e.status_code(), Json(e.to_body(debug_errors))));
        }
    };

    let mut messages = Vec::with_capacity(2);
    if state.config.relay.system_preamble {
        messages.push(ChatMessage::system(SYSTEM_PREAMBLE));
    }
    messages.push(ChatMessage::user(ask));

    match state.client.complete(&messages).await {
        Ok(text) => Ok(Json(envelope(state.config.relay.envelope, text))),
        Err(e) => {
            warn!("Upstream completion failed: {}", e);
            Err((e.status_code(), Json(e.to_body(debug_errors))))
        }
    }
}

fn parse_ask(body: &[u8]) -> Result<String, RelayError> {
    let parsed: Value = serde_json::from_slice(body).map_err(|_| RelayError::InvalidJson)?;
    match parsed.get("ask").and_then(Value::as_str) {
        Some(ask) if !ask.is_empty() => Ok(ask.to_string()),
        _ => Err(RelayError::Validation("Field 'ask' is required".to_string())),
    }
}

fn envelope(style: EnvelopeStyle, text: String) -> Value {
    match style {
        EnvelopeStyle::Plain => json!({ "response": text }),
        EnvelopeStyle::Tagged => json!({
            "endpoint": "responses",
            "status": "success",
            "response": text,
        }),
    }
}

/// Landing page: the static index if one is deployed, a placeholder
/// otherwise.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    let path = Path::new(&state.config.server.static_dir).join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Html(content),
        Err(_) => Html(INDEX_FALLBACK.to_string()),
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "chat-relay-service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
