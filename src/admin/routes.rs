//! REST endpoints for operators.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::channels::{Blocklist, ChannelManager, OutgoingResponse};
use crate::error::ChannelError;
use crate::intake::{IntakeController, SessionStore};
use crate::llm::{TextOracle, mime_from_path};
use crate::store::Database;

/// Shared state for admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub controller: Arc<IntakeController>,
    pub channels: Arc<ChannelManager>,
    pub blocklist: Arc<Blocklist>,
    pub store: Arc<dyn Database>,
    pub oracle: Option<Arc<dyn TextOracle>>,
    /// Channel used when a request doesn't name one.
    pub default_channel: String,
}

impl AdminState {
    fn channel_or_default(&self, requested: Option<String>) -> String {
        requested
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.default_channel.clone())
    }
}

/// Build the admin router.
pub fn admin_routes(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/messages", post(send_message))
        .route("/v1/dispatch", post(dispatch_flow))
        .route("/v1/blacklist", post(update_blacklist))
        .route("/v1/departments", get(list_departments))
        .route("/v1/describe-image", post(describe_image))
        .with_state(state)
}

/// CORS for the admin API: only the listed origins, `*` for any. An empty
/// list answers no cross-origin request.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(origin = %origin, "Ignoring invalid admin origin"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn channel_error_response(e: &ChannelError) -> Response {
    match e {
        ChannelError::UnknownChannel(_) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        _ => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "intake-bot",
        "channels": state.channels.names(),
        "sessions": state.controller.sessions().len().await,
    }))
}

// ── Messages ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    number: String,
    message: String,
    #[serde(rename = "urlMedia", default)]
    url_media: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// POST /v1/messages
async fn send_message(
    State(state): State<AdminState>,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    let channel = state.channel_or_default(body.channel);
    let response = OutgoingResponse::text(body.message)
        .with_media(body.url_media.filter(|u| !u.trim().is_empty()));

    match state.channels.send_to(&channel, &body.number, response).await {
        Ok(()) => {
            info!(channel = %channel, number = %body.number, "Admin message sent");
            Json(serde_json::json!({
                "status": "sent",
                "channel": channel,
                "number": body.number,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(channel = %channel, number = %body.number, error = %e, "Admin message failed");
            channel_error_response(&e)
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Flow {
    /// Feed `message` through the intake dialogue on behalf of `number`.
    Intake,
    /// Forget the conversation with `number`.
    Reset,
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    number: String,
    flow: Flow,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// POST /v1/dispatch
async fn dispatch_flow(
    State(state): State<AdminState>,
    Json(body): Json<DispatchRequest>,
) -> Response {
    let channel = state.channel_or_default(body.channel);
    let key = SessionStore::key(&channel, &body.number);

    match body.flow {
        Flow::Reset => {
            let cleared = state.controller.reset(&key).await;
            info!(session = %key, cleared, "Session reset by operator");
            Json(serde_json::json!({
                "status": "ok",
                "flow": Flow::Reset,
                "number": body.number,
                "cleared": cleared,
            }))
            .into_response()
        }
        Flow::Intake => {
            let Some(message) = body.message.filter(|m| !m.trim().is_empty()) else {
                return error_response(StatusCode::BAD_REQUEST, "intake flow requires a message");
            };
            if state.blocklist.contains(&body.number).await {
                return error_response(StatusCode::FORBIDDEN, "number is blocked");
            }

            let reply = state.controller.handle_text(&key, &message, None).await;

            let delivered = match state
                .channels
                .send_to(&channel, &body.number, reply.clone())
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(session = %key, error = %e, "Dispatched reply not delivered");
                    false
                }
            };

            Json(serde_json::json!({
                "status": "ok",
                "flow": Flow::Intake,
                "number": body.number,
                "delivered": delivered,
                "reply": reply,
            }))
            .into_response()
        }
    }
}

// ── Blacklist ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum Intent {
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
struct BlacklistRequest {
    number: String,
    intent: Intent,
}

/// POST /v1/blacklist
async fn update_blacklist(
    State(state): State<AdminState>,
    Json(body): Json<BlacklistRequest>,
) -> impl IntoResponse {
    let changed = match body.intent {
        Intent::Add => state.blocklist.add(&body.number).await,
        Intent::Remove => state.blocklist.remove(&body.number).await,
    };
    info!(number = %body.number, intent = ?body.intent, changed, "Blocklist updated");

    Json(serde_json::json!({
        "status": "ok",
        "number": body.number,
        "intent": body.intent,
    }))
}

// ── Departments ─────────────────────────────────────────────────────────

/// GET /v1/departments
async fn list_departments(State(state): State<AdminState>) -> Response {
    match state.store.list_addresses().await {
        Ok(departments) => {
            let rows: Vec<serde_json::Value> = departments
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "address": d.address,
                        "messages": d.messages.len(),
                        "created_at": d.created_at,
                    })
                })
                .collect();
            Json(rows).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to list departments");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ── Image description ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DescribeImageRequest {
    /// Base64-encoded image bytes.
    image: String,
    #[serde(default)]
    mime: Option<String>,
    /// Original file name, used to guess the MIME type when `mime` is absent.
    #[serde(default)]
    filename: Option<String>,
}

/// POST /v1/describe-image
async fn describe_image(
    State(state): State<AdminState>,
    Json(body): Json<DescribeImageRequest>,
) -> Response {
    let Some(oracle) = state.oracle.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no oracle configured");
    };

    let bytes = match BASE64.decode(body.image.trim()) {
        Ok(b) if !b.is_empty() => b,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "image is empty"),
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("image is not base64: {e}"));
        }
    };
    let mime = body.mime.unwrap_or_else(|| {
        mime_from_path(Path::new(body.filename.as_deref().unwrap_or_default())).to_string()
    });

    match oracle.describe_image(&bytes, &mime).await {
        Ok(description) => Json(serde_json::json!({
            "model": oracle.model_name(),
            "description": description,
        }))
        .into_response(),
        Err(e) => {
            warn!(mime = %mime, bytes = bytes.len(), error = %e, "Image description failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
