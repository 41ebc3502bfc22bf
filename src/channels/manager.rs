//! ChannelManager: owns the transports and routes replies back to them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Registry of active channels, keyed by name.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A later channel with the same name replaces the earlier one.
    pub fn add(&mut self, channel: Box<dyn Channel>) {
        let name = channel.name().to_string();
        if self.channels.insert(name.clone(), Arc::from(channel)).is_some() {
            tracing::warn!(channel = %name, "Replacing previously registered channel");
        }
    }

    /// Names of the registered channels, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    fn get(&self, name: &str) -> Result<&Arc<dyn Channel>, ChannelError> {
        self.channels
            .get(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Start every channel and merge their streams.
    ///
    /// A channel that fails to start is logged and skipped; it is an error
    /// only when none start.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(s) => {
                    tracing::info!(channel = %name, "Channel started");
                    streams.push(s);
                }
                Err(e) => tracing::error!(channel = %name, error = %e, "Channel failed to start"),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Reply through the channel the message came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.respond(msg, response).await
    }

    /// Send an unsolicited message through a named channel.
    pub async fn send_to(
        &self,
        channel: &str,
        recipient: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(channel)?.send_to(recipient, response).await
    }

    /// Health of every channel, by name.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.channels.len());
        for name in self.names() {
            let ok = match self.channels.get(&name) {
                Some(ch) => ch.health_check().await.is_ok(),
                None => false,
            };
            report.push((name, ok));
        }
        report
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = %name, error = %e, "Channel shutdown failed");
            }
        }
        Ok(())
    }
}
