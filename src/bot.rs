//! Main message loop: pull from every channel, run the intake turn, reply.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::channels::{Blocklist, ChannelManager, IncomingMessage};
use crate::error::Result;
use crate::intake::{IntakeController, spawn_pruning_task};

/// How often idle sessions are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(600);

/// The running bot.
pub struct IntakeBot {
    channels: Arc<ChannelManager>,
    controller: Arc<IntakeController>,
    blocklist: Arc<Blocklist>,
    session_idle_timeout: Duration,
}

impl IntakeBot {
    pub fn new(
        channels: Arc<ChannelManager>,
        controller: Arc<IntakeController>,
        blocklist: Arc<Blocklist>,
        session_idle_timeout: Duration,
    ) -> Self {
        Self {
            channels,
            controller,
            blocklist,
            session_idle_timeout,
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<()> {
        let mut message_stream = self.channels.start_all().await?;

        let pruning_handle = spawn_pruning_task(
            Arc::clone(self.controller.sessions()),
            self.session_idle_timeout,
            PRUNE_INTERVAL,
        );

        tracing::info!(channels = ?self.channels.names(), "Intake bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.handle_message(&message).await;
        }

        tracing::info!("Intake bot shutting down...");
        pruning_handle.abort();
        self.channels.shutdown_all().await?;

        Ok(())
    }

    /// Process one inbound message. Blocked senders get no reply.
    pub async fn handle_message(&self, message: &IncomingMessage) {
        if self.blocklist.contains(&message.user_id).await {
            tracing::debug!(
                channel = %message.channel,
                sender = %message.user_id,
                "Dropping message from blocked sender"
            );
            return;
        }

        let response = self.controller.handle(message).await;

        if let Err(e) = self.channels.respond(message, response).await {
            tracing::warn!(
                channel = %message.channel,
                sender = %message.user_id,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }
}
