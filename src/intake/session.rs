//! Conversation state: per-sender memory carried between intake turns.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::AddressRecord;

/// Where a conversation is in the intake dialogue.
///
/// AwaitingMessage → AwaitingSelection → AwaitingNewAddress → AwaitingMessage.
/// A fresh report restarts the search from any phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakePhase {
    #[default]
    AwaitingMessage,
    AwaitingSelection,
    AwaitingNewAddress,
}

impl IntakePhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: IntakePhase) -> bool {
        use IntakePhase::*;
        matches!(
            (self, target),
            (_, AwaitingSelection)
                | (AwaitingSelection, AwaitingNewAddress)
                | (AwaitingSelection, AwaitingMessage)
                | (AwaitingNewAddress, AwaitingMessage)
        )
    }
}

impl std::fmt::Display for IntakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingMessage => "awaiting_message",
            Self::AwaitingSelection => "awaiting_selection",
            Self::AwaitingNewAddress => "awaiting_new_address",
        };
        write!(f, "{s}")
    }
}

/// State of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub phase: IntakePhase,
    /// The last address-bearing message received.
    pub last_raw_message: Option<String>,
    /// Image attached to that message, if any.
    pub last_image: Option<String>,
    /// Candidates offered in the last prompt, in display order.
    pub last_candidates: Vec<AddressRecord>,
    pub last_activity: DateTime<Utc>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            phase: IntakePhase::default(),
            last_raw_message: None,
            last_image: None,
            last_candidates: Vec::new(),
            last_activity: Utc::now(),
        }
    }
}

impl ConversationState {
    /// Move to `target`, logging illegal edges instead of taking them.
    pub fn transition(&mut self, target: IntakePhase) -> bool {
        if !self.phase.can_transition_to(target) {
            tracing::warn!(from = %self.phase, to = %target, "Rejected intake transition");
            return false;
        }
        self.phase = target;
        true
    }

    /// Candidate at 1-based position `n` of the last prompt.
    pub fn candidate(&self, n: usize) -> Option<&AddressRecord> {
        n.checked_sub(1).and_then(|i| self.last_candidates.get(i))
    }

    /// Drop the pending report and return to the initial phase.
    pub fn finish(&mut self) {
        self.phase = IntakePhase::AwaitingMessage;
        self.last_raw_message = None;
        self.last_image = None;
        self.last_candidates.clear();
    }
}

/// Conversation states keyed by session key (`channel:sender`).
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session key for a sender on a channel.
    pub fn key(channel: &str, sender: &str) -> String {
        format!("{channel}:{sender}")
    }

    /// Snapshot of a session, or a fresh state if none exists yet.
    pub async fn get(&self, key: &str) -> ConversationState {
        self.sessions
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Store `state` under `key`, stamping its activity time.
    pub async fn put(&self, key: &str, mut state: ConversationState) {
        state.last_activity = Utc::now();
        self.sessions.write().await.insert(key.to_string(), state);
    }

    /// Forget a session. Returns whether one existed.
    pub async fn remove(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Evict sessions idle for longer than `idle`. Returns how many were removed.
    pub async fn prune_stale(&self, idle: Duration) -> usize {
        let Ok(idle) = chrono::Duration::from_std(idle) else {
            return 0;
        };
        let cutoff = Utc::now() - idle;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| state.last_activity >= cutoff);
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, remaining = sessions.len(), "Pruned idle intake sessions");
        }
        pruned
    }
}

/// Spawn a background task that prunes idle sessions every `every`.
pub fn spawn_pruning_task(
    sessions: std::sync::Arc<SessionStore>,
    idle: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip immediate first tick
        loop {
            interval.tick().await;
            sessions.prune_stale(idle).await;
        }
    })
}
