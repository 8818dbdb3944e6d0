//! Conversation session: history assembly, in-flight gating, and the
//! incremental streaming draft.
//!
//! This is the one stateful component of the application. Everything else
//! is either wire plumbing (`ai`) or rendering driven by this state.

use crate::ai::{ChatStreamService, TurnRequest};
use crate::models::{AttachedImage, ConversationLog, Message};
use crate::prompts;
use crate::Result;
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// What a call to [`ChatSession::submit`] did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The streamed reply was committed as a new assistant message.
    Committed,
    /// The remote call failed; the fixed failure message was appended.
    Failed,
    /// Blank text with no image: nothing changed.
    Ignored,
    /// A previous submission is still streaming: nothing changed.
    Busy,
    /// No usable API key; the user turn and the warning were appended
    /// without touching the network.
    MissingCredential,
}

struct SessionState {
    log: ConversationLog,
    /// In-flight assistant reply; empty unless a turn is streaming.
    /// Every update replaces the whole string with a longer prefix.
    draft: String,
    in_flight: bool,
}

/// A single conversation with the assistant.
///
/// Clones share the same log and in-flight gate, so one handle can render
/// while another submits. The lock is never held across an await; the
/// `in_flight` flag (not the lock) is what serializes submissions.
#[derive(Clone)]
pub struct ChatSession {
    service: Arc<dyn ChatStreamService>,
    state: Arc<Mutex<SessionState>>,
    credential_present: bool,
    stream_delay: Option<Duration>,
    session_id: Uuid,
}

impl ChatSession {
    /// Start a session seeded with the greeting, or with the credential
    /// warning when no usable API key is configured.
    pub fn new(service: Arc<dyn ChatStreamService>, credential_present: bool) -> Self {
        let session_id = Uuid::new_v4();
        info!(%session_id, credential_present, "Starting chat session");

        let mut log = ConversationLog::new();
        let seed = if credential_present {
            prompts::GREETING
        } else {
            prompts::API_KEY_WARNING
        };
        log.push(Message::assistant(seed));

        Self {
            service,
            state: Arc::new(Mutex::new(SessionState {
                log,
                draft: String::new(),
                in_flight: false,
            })),
            credential_present,
            stream_delay: None,
            session_id,
        }
    }

    /// Pace streamed fragments with a fixed pause. Cosmetic only; off by
    /// default.
    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Snapshot of the log, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state().log.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.state().in_flight
    }

    /// The partial reply streamed so far, while a turn is in flight and
    /// at least one fragment has arrived.
    pub fn draft(&self) -> Option<String> {
        let state = self.state();
        (state.in_flight && !state.draft.is_empty()).then(|| state.draft.clone())
    }

    /// Submit one user turn and stream the reply.
    ///
    /// `on_draft` is invoked after each fragment with the full accumulated
    /// reply text (a prefix replace, not a diff). Remote failures are
    /// absorbed into the fixed failure message; this method never errors.
    pub async fn submit<F>(
        &self,
        text: &str,
        image: Option<AttachedImage>,
        mut on_draft: F,
    ) -> SubmitOutcome
    where
        F: FnMut(&str),
    {
        if text.trim().is_empty() && image.is_none() {
            return SubmitOutcome::Ignored;
        }

        let request = {
            let mut state = self.state();
            if state.in_flight {
                return SubmitOutcome::Busy;
            }

            let display_text = if text.trim().is_empty() {
                prompts::IMAGE_ONLY_PLACEHOLDER.to_string()
            } else {
                text.to_string()
            };
            let message = match image {
                Some(image) => Message::user_with_image(display_text, image),
                None => Message::user(display_text),
            };
            state.log.push(message);

            if !self.credential_present {
                state.log.push(Message::assistant(prompts::API_KEY_WARNING));
                return SubmitOutcome::MissingCredential;
            }

            state.in_flight = true;
            state.draft.clear();

            TurnRequest {
                system: prompts::SYSTEM_PREAMBLE.trim().to_string(),
                history: state.log.snapshot(),
            }
        };

        info!(
            session_id = %self.session_id,
            turns = request.history.len(),
            "Submitting turn"
        );

        match self.run_turn(request, &mut on_draft).await {
            Ok(reply) => {
                let mut state = self.state();
                state.log.push(Message::assistant(reply));
                state.draft.clear();
                state.in_flight = false;
                SubmitOutcome::Committed
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Turn failed: {}", e);
                let mut state = self.state();
                state
                    .log
                    .push(Message::assistant(prompts::REMOTE_FAILURE_MESSAGE));
                state.draft.clear();
                state.in_flight = false;
                SubmitOutcome::Failed
            }
        }
    }

    async fn run_turn<F>(&self, request: TurnRequest, on_draft: &mut F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut stream = self.service.stream_reply(request).await?;
        let mut reply = String::new();

        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment?);
            {
                let mut state = self.state();
                state.draft.clear();
                state.draft.push_str(&reply);
            }
            on_draft(&reply);

            if let Some(delay) = self.stream_delay {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(reply)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }
}
