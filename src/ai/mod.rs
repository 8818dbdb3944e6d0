//! AI service integration for streamed chat replies
//!
//! Defines the provider-neutral streaming chat interface plus the Gemini
//! implementation and a scripted mock for tests.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::GeminiChatClient;
pub use mock::MockChatClient;

use crate::models::Message;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of reply text fragments, in arrival order.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Everything a provider needs for one turn: the instruction preamble and
/// the full conversation log, oldest first, ending with the new user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub system: String,
    pub history: Vec<Message>,
}

#[async_trait]
pub trait ChatStreamService: Send + Sync {
    /// Open a streaming reply for the assembled turn.
    ///
    /// Errors returned here (or yielded mid-stream) are absorbed by the
    /// session and replaced with its fixed failure message.
    async fn stream_reply(&self, request: TurnRequest) -> Result<ReplyStream>;
}
