//! Telegram channel — long-polls the Bot API for updates.
//!
//! Text messages and captioned photos become [`IncomingMessage`]s; a photo's
//! caption is the report text and its largest size's `file_id` is the image
//! reference. Reply buttons are rendered as a one-time reply keyboard.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum caption length for sendPhoto.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

/// Telegram channel. Connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            allowed_users: config.allowed_users.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    /// Send a text message, splitting past Telegram's limit. The keyboard
    /// rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[String],
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = (i == last).then(|| reply_markup(buttons));
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk, Markdown-first with plain fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = markup {
            body["reply_markup"] = markup;
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        if let Some(obj) = body.as_object_mut() {
            obj.remove("parse_mode");
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }

    /// Send a photo by URL (Telegram downloads it).
    pub async fn send_photo_by_url(
        &self,
        chat_id: &str,
        url: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "photo": url
        });

        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendPhoto by URL failed: {err}");
        }

        tracing::info!("Telegram photo (URL) sent to {chat_id}: {url}");
        Ok(())
    }

    async fn deliver(&self, chat_id: &str, response: OutgoingResponse) -> Result<(), ChannelError> {
        let Some(url) = response.media_url.as_deref() else {
            return self
                .send_message(chat_id, &response.content, &response.buttons)
                .await;
        };

        let fits_caption = response.buttons.is_empty()
            && response.content.chars().count() <= TELEGRAM_MAX_CAPTION_LENGTH;
        let caption = fits_caption.then_some(response.content.as_str());

        self.send_photo_by_url(chat_id, url, caption)
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !fits_caption && !response.content.is_empty() {
            self.send_message(chat_id, &response.content, &response.buttons)
                .await?;
        }
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };

                    let Some(incoming) = parse_message(message, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(Value::as_str)
            .unwrap_or(&msg.user_id);

        self.deliver(chat_id, response).await
    }

    async fn send_to(
        &self,
        recipient: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.deliver(recipient, response).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Turn a Bot API `message` object into an [`IncomingMessage`].
///
/// Returns `None` for unauthorized senders and for messages with neither
/// text nor a photo.
fn parse_message(message: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let photo_id = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|p| p.get("file_id"))
        .and_then(Value::as_str);

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if text.is_empty() && photo_id.is_none() {
        return None;
    }

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    // Sessions are keyed by sender, so an anonymous sender (channel posts,
    // no `from`) is identified by its chat rather than a shared placeholder.
    let Some(sender) = user_id.or_else(|| (!chat_id.is_empty()).then(|| chat_id.clone())) else {
        tracing::debug!("Telegram: skipping message with neither sender nor chat id");
        return None;
    };

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .unwrap_or(username);

    let mut incoming =
        IncomingMessage::new("telegram", sender.as_str(), text)
            .with_user_name(first_name)
            .with_metadata(serde_json::json!({
                "chat_id": chat_id,
                "username": username,
            }));
    if let Some(file_id) = photo_id {
        incoming = incoming.with_image(file_id);
    }
    Some(incoming)
}

/// One button per row, hidden after use; no buttons removes any keyboard.
fn reply_markup(buttons: &[String]) -> Value {
    if buttons.is_empty() {
        return serde_json::json!({ "remove_keyboard": true });
    }
    let rows: Vec<Value> = buttons
        .iter()
        .map(|b| serde_json::json!([{ "text": b }]))
        .collect();
    serde_json::json!({
        "keyboard": rows,
        "one_time_keyboard": true,
        "resize_keyboard": true,
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(&TelegramConfig {
            bot_token: SecretString::from("fake-token"),
            allowed_users: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn allow_all() -> Vec<String> {
        vec!["*".to_string()]
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(&["*"]).api_url("getMe"),
            "https://api.telegram.org/botfake-token/getMe"
        );
    }

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(channel(&["*"]).is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let ch = channel(&["alice"]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("alice_bot"));
        assert!(!ch.is_user_allowed("malice"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        assert!(!channel(&[]).is_user_allowed("anyone"));
    }

    #[test]
    fn parses_text_message() {
        let message = serde_json::json!({
            "message_id": 1,
            "from": { "id": 42, "username": "ana", "first_name": "Ana" },
            "chat": { "id": 42 },
            "text": "Hay humedad en palermo 1584"
        });
        let msg = parse_message(&message, &allow_all()).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.user_name.as_deref(), Some("Ana"));
        assert_eq!(msg.content, "Hay humedad en palermo 1584");
        assert_eq!(msg.metadata["chat_id"], "42");
        assert!(msg.image.is_none());
    }

    #[test]
    fn photo_caption_becomes_content_and_largest_file_id_the_image() {
        let message = serde_json::json!({
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "caption": "rotura en moreno 55",
            "photo": [
                { "file_id": "small", "width": 90 },
                { "file_id": "large", "width": 1280 }
            ]
        });
        let msg = parse_message(&message, &allow_all()).unwrap();
        assert_eq!(msg.content, "rotura en moreno 55");
        assert_eq!(msg.image.as_deref(), Some("large"));
    }

    #[test]
    fn uncaptioned_photo_is_kept_with_empty_content() {
        let message = serde_json::json!({
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "photo": [{ "file_id": "only" }]
        });
        let msg = parse_message(&message, &allow_all()).unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.image.as_deref(), Some("only"));
    }

    #[test]
    fn sticker_without_text_is_skipped() {
        let message = serde_json::json!({
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "sticker": { "file_id": "s" }
        });
        assert!(parse_message(&message, &allow_all()).is_none());
    }

    #[test]
    fn unauthorized_sender_is_skipped() {
        let message = serde_json::json!({
            "from": { "id": 7, "username": "eve" },
            "chat": { "id": 7 },
            "text": "hola"
        });
        assert!(parse_message(&message, &["alice".to_string()]).is_none());
        assert!(parse_message(&message, &["7".to_string()]).is_some());
    }

    #[test]
    fn sender_without_from_is_keyed_by_chat() {
        let first = serde_json::json!({
            "chat": { "id": -1001 },
            "text": "gotera en moreno"
        });
        let second = serde_json::json!({
            "chat": { "id": -1002 },
            "text": "luz rota en palermo"
        });
        let first = parse_message(&first, &allow_all()).unwrap();
        let second = parse_message(&second, &allow_all()).unwrap();
        assert_eq!(first.user_id, "-1001");
        assert_eq!(second.user_id, "-1002");
        assert_ne!(first.user_id, second.user_id);
    }

    #[test]
    fn message_without_sender_or_chat_is_skipped() {
        let message = serde_json::json!({ "text": "gotera en moreno" });
        assert!(parse_message(&message, &allow_all()).is_none());
    }

    #[test]
    fn keyboard_has_one_button_per_row() {
        let markup = reply_markup(&["Seleccionar: 1".into(), "Crear nuevo".into()]);
        assert_eq!(markup["keyboard"][0][0]["text"], "Seleccionar: 1");
        assert_eq!(markup["keyboard"][1][0]["text"], "Crear nuevo");
        assert_eq!(markup["one_time_keyboard"], true);
    }

    #[test]
    fn no_buttons_removes_keyboard() {
        assert_eq!(reply_markup(&[])["remove_keyboard"], true);
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("hola", 10), vec!["hola"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let chunks = split_message("línea uno\nlínea dos", 14);
        assert_eq!(chunks, vec!["línea uno", "línea dos"]);
    }

    #[test]
    fn split_message_never_cuts_inside_a_char() {
        let text = "ñ".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}
