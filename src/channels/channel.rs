//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message received from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced it.
    pub channel: String,
    /// Stable sender identifier (chat id, phone number).
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: String,
    /// Image reference attached to the message (file id or URL).
    pub image: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Transport-specific routing data.
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            content: content.to_string(),
            image: None,
            received_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A reply to send through a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingResponse {
    pub content: String,
    /// Selectable options; transports without buttons list them as text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
    /// Media to attach, by URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl OutgoingResponse {
    /// Plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<String>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_media(mut self, url: Option<String>) -> Self {
        self.media_url = url;
        self
    }

    /// Text rendering for transports that can't show buttons.
    pub fn render_plain(&self) -> String {
        if self.buttons.is_empty() {
            return self.content.clone();
        }
        let options = self
            .buttons
            .iter()
            .map(|b| format!("  [{b}]"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\n{options}", self.content)
    }
}

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name used for routing replies.
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply to a message this channel produced.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Send an unsolicited message to a recipient.
    async fn send_to(
        &self,
        recipient: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
