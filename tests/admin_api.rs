//! Admin router and message-loop behavior, exercised without a network.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use axum::http::{Request, StatusCode};
use tokio::sync::Mutex;
use tower::ServiceExt;

use intake_bot::admin::{AdminState, admin_routes, cors_layer};
use intake_bot::bot::IntakeBot;
use intake_bot::channels::{
    Blocklist, Channel, ChannelManager, IncomingMessage, MessageStream, OutgoingResponse,
};
use intake_bot::error::{ChannelError, LlmError};
use intake_bot::intake::{IntakeController, IntakePhase, SessionStore};
use intake_bot::llm::TextOracle;
use intake_bot::store::{Database, LibSqlBackend};

type Outbox = Arc<Mutex<Vec<(String, OutgoingResponse)>>>;

/// Channel that records everything sent through it.
struct RecordingChannel {
    outbox: Outbox,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "test"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.outbox.lock().await.push((msg.user_id.clone(), response));
        Ok(())
    }

    async fn send_to(
        &self,
        recipient: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.outbox
            .lock()
            .await
            .push((recipient.to_string(), response));
        Ok(())
    }
}

struct EchoOracle;

#[async_trait]
impl TextOracle for EchoOracle {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn summarize(&self, text: &str) -> Result<String, LlmError> {
        Ok(text.to_string())
    }

    async fn describe_image(&self, image: &[u8], mime_type: &str) -> Result<String, LlmError> {
        Ok(format!("{} bytes of {mime_type}", image.len()))
    }
}

struct Harness {
    state: AdminState,
    outbox: Outbox,
}

async fn harness(oracle: Option<Arc<dyn TextOracle>>) -> Harness {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));

    let mut channels = ChannelManager::new();
    channels.add(Box::new(RecordingChannel {
        outbox: Arc::clone(&outbox),
    }));

    let controller = Arc::new(IntakeController::new(
        Arc::clone(&store),
        Arc::new(SessionStore::new()),
        10,
    ));

    Harness {
        state: AdminState {
            controller,
            channels: Arc::new(channels),
            blocklist: Arc::new(Blocklist::default()),
            store,
            oracle,
            default_channel: "test".to_string(),
        },
        outbox,
    }
}

async fn call(
    state: &AdminState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = admin_routes(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_lists_channels() {
    let h = harness(None).await;
    let (status, json) = call(&h.state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["channels"], serde_json::json!(["test"]));
}

#[tokio::test]
async fn send_message_goes_through_default_channel() {
    let h = harness(None).await;
    let (status, json) = call(
        &h.state,
        "POST",
        "/v1/messages",
        Some(serde_json::json!({
            "number": "5491100000000",
            "message": "Recordatorio de mantenimiento",
            "urlMedia": "https://example.com/aviso.png"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "sent");

    let outbox = h.outbox.lock().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].0, "5491100000000");
    assert_eq!(outbox[0].1.content, "Recordatorio de mantenimiento");
    assert_eq!(
        outbox[0].1.media_url.as_deref(),
        Some("https://example.com/aviso.png")
    );
}

#[tokio::test]
async fn send_message_to_unknown_channel_is_bad_request() {
    let h = harness(None).await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/messages",
        Some(serde_json::json!({ "number": "1", "message": "x", "channel": "whatsapp" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatch_intake_runs_the_dialogue_and_delivers() {
    let h = harness(None).await;
    h.state.store.upsert_address("Moreno 55").await.unwrap();

    let (status, json) = call(
        &h.state,
        "POST",
        "/v1/dispatch",
        Some(serde_json::json!({
            "number": "77",
            "flow": "intake",
            "message": "gotera en moreno"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["delivered"], true);
    assert_eq!(json["reply"]["buttons"][0], "Seleccionar: 1");

    let state = h.state.controller.sessions().get("test:77").await;
    assert_eq!(state.phase, IntakePhase::AwaitingSelection);
    assert_eq!(h.outbox.lock().await[0].0, "77");
}

#[tokio::test]
async fn dispatch_reset_clears_the_session() {
    let h = harness(None).await;
    h.state
        .controller
        .handle_text("test:77", "gotera en moreno", None)
        .await;

    let (status, json) = call(
        &h.state,
        "POST",
        "/v1/dispatch",
        Some(serde_json::json!({ "number": "77", "flow": "reset" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], true);
    assert!(h.state.controller.sessions().is_empty().await);
}

#[tokio::test]
async fn dispatch_intake_without_message_is_rejected() {
    let h = harness(None).await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/dispatch",
        Some(serde_json::json!({ "number": "77", "flow": "intake" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatch_intake_for_blocked_number_is_forbidden() {
    let h = harness(None).await;
    h.state.blocklist.add("77").await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/dispatch",
        Some(serde_json::json!({ "number": "77", "flow": "intake", "message": "gotera en moreno" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.outbox.lock().await.is_empty());
}

#[tokio::test]
async fn blacklist_add_and_remove() {
    let h = harness(None).await;

    let (status, json) = call(
        &h.state,
        "POST",
        "/v1/blacklist",
        Some(serde_json::json!({ "number": "5491", "intent": "add" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        serde_json::json!({ "status": "ok", "number": "5491", "intent": "add" })
    );
    assert!(h.state.blocklist.contains("5491").await);

    let (_, json) = call(
        &h.state,
        "POST",
        "/v1/blacklist",
        Some(serde_json::json!({ "number": "5491", "intent": "remove" })),
    )
    .await;
    assert_eq!(json["intent"], "remove");
    assert!(!h.state.blocklist.contains("5491").await);
}

#[tokio::test]
async fn blacklist_rejects_unknown_intent() {
    let h = harness(None).await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/blacklist",
        Some(serde_json::json!({ "number": "5491", "intent": "toggle" })),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn departments_list_counts_messages() {
    let h = harness(None).await;
    h.state.store.upsert_address("Moreno 55").await.unwrap();
    h.state
        .controller
        .handle_text("test:1", "gotera en moreno", None)
        .await;
    h.state
        .controller
        .handle_text("test:1", "Seleccionar: 1", None)
        .await;

    let (status, json) = call(&h.state, "GET", "/v1/departments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["address"], "Moreno 55");
    assert_eq!(json[0]["messages"], 1);
}

#[tokio::test]
async fn describe_image_without_oracle_is_unavailable() {
    let h = harness(None).await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({ "image": BASE64.encode([0xFF, 0xD8]) })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn describe_image_decodes_the_uploaded_bytes() {
    let h = harness(Some(Arc::new(EchoOracle) as Arc<dyn TextOracle>)).await;

    let (status, json) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({
            "image": BASE64.encode([0xFF, 0xD8, 0xFF, 0xE0]),
            "filename": "pared.jpg"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "4 bytes of image/jpeg");
    assert_eq!(json["model"], "echo");
}

#[tokio::test]
async fn describe_image_explicit_mime_wins() {
    let h = harness(Some(Arc::new(EchoOracle) as Arc<dyn TextOracle>)).await;
    let (_, json) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({
            "image": BASE64.encode([1, 2]),
            "mime": "image/webp",
            "filename": "pared.jpg"
        })),
    )
    .await;
    assert_eq!(json["description"], "2 bytes of image/webp");
}

#[tokio::test]
async fn describe_image_never_reads_server_paths() {
    let h = harness(Some(Arc::new(EchoOracle) as Arc<dyn TextOracle>)).await;

    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({ "path": "/etc/passwd" })),
    )
    .await;
    assert!(status.is_client_error());

    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({ "image": "/etc/passwd" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn describe_image_rejects_empty_upload() {
    let h = harness(Some(Arc::new(EchoOracle) as Arc<dyn TextOracle>)).await;
    let (status, _) = call(
        &h.state,
        "POST",
        "/v1/describe-image",
        Some(serde_json::json!({ "image": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── CORS ────────────────────────────────────────────────────────────────

async fn allowed_origin(origins: &[&str], origin: &str) -> Option<String> {
    let h = harness(None).await;
    let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
    let app = admin_routes(h.state.clone()).layer(cors_layer(&origins));

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("origin", origin)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get("access-control-allow-origin")
        .map(|v| v.to_str().unwrap().to_string())
}

#[tokio::test]
async fn cors_without_configured_origins_allows_none() {
    assert_eq!(allowed_origin(&[], "https://evil.example").await, None);
}

#[tokio::test]
async fn cors_allows_only_listed_origins() {
    let listed = ["https://panel.example.com"];
    assert_eq!(
        allowed_origin(&listed, "https://panel.example.com").await.as_deref(),
        Some("https://panel.example.com")
    );
    assert_eq!(allowed_origin(&listed, "https://evil.example").await, None);
}

// ── Message loop ────────────────────────────────────────────────────────

#[tokio::test]
async fn blocked_senders_get_no_reply() {
    let h = harness(None).await;
    h.state.blocklist.add("spam").await;
    let bot = IntakeBot::new(
        Arc::clone(&h.state.channels),
        Arc::clone(&h.state.controller),
        Arc::clone(&h.state.blocklist),
        std::time::Duration::from_secs(3600),
    );

    bot.handle_message(&IncomingMessage::new("test", "spam", "gotera en moreno"))
        .await;
    assert!(h.outbox.lock().await.is_empty());
    assert!(h.state.controller.sessions().is_empty().await);

    bot.handle_message(&IncomingMessage::new("test", "vecino", "gotera en moreno"))
        .await;
    let outbox = h.outbox.lock().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].0, "vecino");
}
