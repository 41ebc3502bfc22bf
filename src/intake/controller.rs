//! IntakeController: drives the report dialogue for every conversation.
//!
//! One call to [`IntakeController::handle`] is one turn: classify the inbound
//! text, apply the transition for the conversation's phase, persist the
//! session, and return exactly one reply. Every (phase, input) pair maps to
//! a reply; store failures become an apology and leave the session as it was
//! when the failure happened.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channels::{IncomingMessage, OutgoingResponse};
use crate::error::{DatabaseError, IntakeError};
use crate::llm::TextOracle;
use crate::store::{AddressRecord, ContentRecord, Database};

use super::matcher::find_candidates_capped;
use super::replies::{self, FailedStep};
use super::session::{ConversationState, IntakePhase, SessionStore};
use super::splitter::extract_content;
use super::triggers::{Inbound, classify};

/// How long a confirmation waits for the oracle summary by default.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Coordinates address matching, session state, and persistence.
pub struct IntakeController {
    store: Arc<dyn Database>,
    sessions: Arc<SessionStore>,
    oracle: Option<Arc<dyn TextOracle>>,
    oracle_timeout: Duration,
    max_candidates: usize,
}

impl IntakeController {
    pub fn new(store: Arc<dyn Database>, sessions: Arc<SessionStore>, max_candidates: usize) -> Self {
        Self {
            store,
            sessions,
            oracle: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Attach an oracle whose summaries are appended to confirmations.
    pub fn with_oracle(mut self, oracle: Option<Arc<dyn TextOracle>>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Bound the wait for a summary; past it the confirmation goes out without one.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Process one inbound message and produce the reply.
    pub async fn handle(&self, msg: &IncomingMessage) -> OutgoingResponse {
        let key = SessionStore::key(&msg.channel, &msg.user_id);
        self.handle_text(&key, &msg.content, msg.image.clone()).await
    }

    /// Process one turn for the session `key`.
    pub async fn handle_text(&self, key: &str, text: &str, image: Option<String>) -> OutgoingResponse {
        let mut state = self.sessions.get(key).await;
        let inbound = classify(text);
        debug!(session = key, phase = %state.phase, inbound = inbound.kind(), "Intake turn");

        let reply = self.dispatch(key, &mut state, text, image, inbound).await;

        self.sessions.put(key, state).await;
        reply
    }

    /// Forget the conversation for `key`.
    pub async fn reset(&self, key: &str) -> bool {
        self.sessions.remove(key).await
    }

    async fn dispatch(
        &self,
        key: &str,
        state: &mut ConversationState,
        text: &str,
        image: Option<String>,
        inbound: Inbound,
    ) -> OutgoingResponse {
        use IntakePhase::*;

        match (state.phase, inbound) {
            (_, Inbound::AddressBearing) => {
                let result = self.start_search(state, text, image).await;
                self.settle(key, result, FailedStep::Search)
            }
            (AwaitingSelection, Inbound::CreateNew) => {
                state.transition(AwaitingNewAddress);
                replies::new_address_prompt()
            }
            (AwaitingSelection, Inbound::Select(Some(n))) if state.candidate(n).is_some() => {
                let result = self.select_candidate(state, n).await;
                self.settle(key, result, FailedStep::Selection)
            }
            (AwaitingSelection | AwaitingNewAddress, Inbound::NewAddress(address))
                if !address.is_empty() =>
            {
                let result = self.create_and_file(state, &address).await;
                self.settle(key, result, FailedStep::Creation)
            }
            (AwaitingSelection, other) => {
                self.log_parse_failure(key, state.phase, &other);
                replies::invalid_selection(state.last_candidates.len())
            }
            (AwaitingNewAddress, other) => {
                self.log_parse_failure(key, state.phase, &other);
                replies::invalid_new_address()
            }
            (AwaitingMessage, other) => {
                self.log_parse_failure(key, state.phase, &other);
                replies::usage_hint()
            }
        }
    }

    /// Turn a transition result into the reply, logging store failures.
    fn settle(
        &self,
        key: &str,
        result: Result<OutgoingResponse, IntakeError>,
        step: FailedStep,
    ) -> OutgoingResponse {
        match result {
            Ok(reply) => reply,
            Err(e) if e.is_store_failure() => {
                error!(session = key, error = %e, "Intake turn failed");
                replies::apology(step)
            }
            Err(e) => {
                warn!(session = key, error = %e, "Intake turn rejected");
                replies::usage_hint()
            }
        }
    }

    fn log_parse_failure(&self, key: &str, phase: IntakePhase, inbound: &Inbound) {
        let err = IntakeError::Parse(format!("{} while {phase}", inbound.kind()));
        debug!(session = key, error = %err, "Unrecognized reply");
    }

    /// Record the report and offer matching departments.
    async fn start_search(
        &self,
        state: &mut ConversationState,
        text: &str,
        image: Option<String>,
    ) -> Result<OutgoingResponse, IntakeError> {
        state.last_raw_message = Some(text.to_string());
        state.last_image = image;

        let known = self.store.list_addresses().await.map_err(IntakeError::Lookup)?;
        let candidates = find_candidates_capped(text, &known, self.max_candidates);

        info!(
            known = known.len(),
            candidates = candidates.len(),
            "Department search complete"
        );

        let reply = replies::candidates_prompt(&candidates);
        state.last_candidates = candidates;
        state.transition(IntakePhase::AwaitingSelection);
        Ok(reply)
    }

    /// File the pending report under the `n`-th offered candidate.
    async fn select_candidate(
        &self,
        state: &mut ConversationState,
        n: usize,
    ) -> Result<OutgoingResponse, IntakeError> {
        let offered = state
            .candidate(n)
            .map(|c| c.id)
            .ok_or_else(|| IntakeError::Parse(format!("no candidate {n}")))?;

        let department = self
            .store
            .get_address(offered)
            .await
            .map_err(IntakeError::Lookup)?
            .ok_or_else(|| {
                IntakeError::Lookup(DatabaseError::NotFound {
                    entity: "department".into(),
                    id: offered.to_string(),
                })
            })?;

        self.file_report(state, department).await
    }

    /// Upsert the typed address and file the pending report under it.
    async fn create_and_file(
        &self,
        state: &mut ConversationState,
        address: &str,
    ) -> Result<OutgoingResponse, IntakeError> {
        if state.last_raw_message.is_none() {
            return Err(IntakeError::Parse("no pending report".into()));
        }

        let department = self
            .store
            .upsert_address(address)
            .await
            .map_err(IntakeError::Persistence)?;

        self.file_report(state, department).await
    }

    /// Create the content record, link it, and confirm.
    async fn file_report(
        &self,
        state: &mut ConversationState,
        department: AddressRecord,
    ) -> Result<OutgoingResponse, IntakeError> {
        let text = state
            .last_raw_message
            .clone()
            .ok_or_else(|| IntakeError::Parse("no pending report".into()))?;

        let content =
            ContentRecord::new(text.as_str(), department.id).with_image(state.last_image.clone());

        self.store
            .create_content(&content)
            .await
            .map_err(IntakeError::Persistence)?;
        self.store
            .append_content_to_address(department.id, content.id)
            .await
            .map_err(IntakeError::Persistence)?;

        let display = extract_content(&text, &department.address);
        info!(
            department_id = %department.id,
            message_id = %content.id,
            address = %department.address,
            "Report filed"
        );

        let summary = self.summarize(&text).await;

        state.transition(IntakePhase::AwaitingMessage);
        state.finish();

        Ok(replies::saved_confirmation(
            &department.address,
            &display,
            summary.as_deref(),
        ))
    }

    async fn summarize(&self, text: &str) -> Option<String> {
        let oracle = self.oracle.as_ref()?;
        match tokio::time::timeout(self.oracle_timeout, oracle.summarize(text)).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                warn!(model = oracle.model_name(), error = %e, "Oracle summary failed");
                None
            }
            Err(_) => {
                warn!(
                    model = oracle.model_name(),
                    timeout_secs = self.oracle_timeout.as_secs_f64(),
                    "Oracle summary timed out"
                );
                None
            }
        }
    }
}
