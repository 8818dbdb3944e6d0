//! Data models and structures
//!
//! Defines the conversation log entries exchanged with the assistant and
//! the environment-driven runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Who produced a given turn in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// Base64-encoded image payload carried by the message that introduced it.
///
/// Never mutated after creation; the same encoded bytes are replayed on
/// every subsequent turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedImage {
    pub mime_type: String,
    /// Standard base64 encoding of the raw image bytes.
    pub data: String,
}

impl AttachedImage {
    /// Encode raw image bytes, sniffing the MIME type from magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use base64::Engine as _;

        Self {
            mime_type: crate::ai::mime::detect_image_mime(bytes).to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<AttachedImage>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            image: None,
        }
    }

    pub fn user_with_image(text: impl Into<String>, image: AttachedImage) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            image: Some(image),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            image: None,
        }
    }
}

/// Ordered, append-only sequence of messages.
///
/// Insertion order defines both the display order and the order replayed
/// to the remote API. Entries are never edited or removed for the life
/// of the session.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.entries.push(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    /// Clone of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }
}

const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when the key is absent or still the placeholder value; the
    /// session then runs in a warning state without touching the network.
    pub api_key: Option<String>,
    pub model: String,
    /// Covers the whole streamed response, not just the connect phase.
    pub request_timeout: Duration,
    /// Cosmetic pause between streamed fragments; disabled when zero.
    pub stream_delay: Option<Duration>,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = Self::sanitize_key(std::env::var("GEMINI_API_KEY").ok());
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; submissions will be short-circuited");
        }

        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                crate::Error::Config(format!("REQUEST_TIMEOUT_SECS is not a number: {}", raw))
            })?),
            Err(_) => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let stream_delay = match std::env::var("STREAM_DELAY_MS") {
            Ok(raw) => {
                let ms = raw.parse::<u64>().map_err(|_| {
                    crate::Error::Config(format!("STREAM_DELAY_MS is not a number: {}", raw))
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            Err(_) => None,
        };

        Ok(Self {
            api_key,
            model,
            request_timeout,
            stream_delay,
        })
    }

    /// Treat an empty or placeholder key the same as an absent one.
    fn sanitize_key(raw: Option<String>) -> Option<String> {
        raw.filter(|key| !key.trim().is_empty() && key != PLACEHOLDER_API_KEY)
    }
}
