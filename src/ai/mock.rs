use super::{ChatStreamService, ReplyStream, TurnRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply: the fragments to stream, then an optional failure.
#[derive(Debug, Clone)]
enum Script {
    Reply(Vec<String>),
    FailAfter(Vec<String>),
    ConnectFailure,
}

/// Scripted stand-in for the Gemini client.
///
/// Replies cycle through the configured scripts; with none configured it
/// streams a single canned fragment. Captures every request it receives
/// so tests can assert on the assembled history.
#[derive(Clone)]
pub struct MockChatClient {
    scripts: Arc<Mutex<Vec<Script>>>,
    requests: Arc<Mutex<Vec<TurnRequest>>>,
    call_count: Arc<Mutex<usize>>,
    chunk_delay: Option<Duration>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            chunk_delay: None,
        }
    }

    /// Queue a successful reply streamed as the given fragments.
    pub fn with_reply(self, fragments: &[&str]) -> Self {
        self.scripts.lock().unwrap().push(Script::Reply(
            fragments.iter().map(|f| f.to_string()).collect(),
        ));
        self
    }

    /// Queue a reply that yields the given fragments and then errors.
    pub fn with_failure_after(self, fragments: &[&str]) -> Self {
        self.scripts.lock().unwrap().push(Script::FailAfter(
            fragments.iter().map(|f| f.to_string()).collect(),
        ));
        self
    }

    /// Queue a call that fails before any fragment is produced.
    pub fn with_connect_failure(self) -> Self {
        self.scripts.lock().unwrap().push(Script::ConnectFailure);
        self
    }

    /// Pause between fragments, for exercising in-flight behavior.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Every request received so far, in call order.
    pub fn captured_requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStreamService for MockChatClient {
    async fn stream_reply(&self, request: TurnRequest) -> Result<ReplyStream> {
        let count = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.requests.lock().unwrap().push(request);

        let script = {
            let scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                Script::Reply(vec!["Mock nutrition advice.".to_string()])
            } else {
                scripts[(count - 1) % scripts.len()].clone()
            }
        };

        if matches!(script, Script::ConnectFailure) {
            return Err(Error::AiProvider("mock connect failure".to_string()));
        }

        let (fragments, fail) = match script {
            Script::Reply(fragments) => (fragments, false),
            Script::FailAfter(fragments) => (fragments, true),
            Script::ConnectFailure => unreachable!("handled above"),
        };

        let chunk_delay = self.chunk_delay;
        let stream = async_stream::stream! {
            for fragment in fragments {
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(fragment);
            }

            if fail {
                yield Err(Error::AiProvider("mock stream failure".to_string()));
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn drain(stream: ReplyStream) -> Result<String> {
        let fragments: Vec<String> = stream.try_collect().await?;
        Ok(fragments.concat())
    }

    fn request() -> TurnRequest {
        TurnRequest {
            system: "sys".to_string(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_default_reply_and_call_count() {
        let client = MockChatClient::new();
        assert_eq!(client.get_call_count(), 0);

        let text = drain(client.stream_reply(request()).await.unwrap())
            .await
            .unwrap();
        assert_eq!(text, "Mock nutrition advice.");
        assert_eq!(client.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_replies_cycle() {
        let client = MockChatClient::new()
            .with_reply(&["first"])
            .with_reply(&["second, ", "in two parts"]);

        let one = drain(client.stream_reply(request()).await.unwrap())
            .await
            .unwrap();
        let two = drain(client.stream_reply(request()).await.unwrap())
            .await
            .unwrap();
        let three = drain(client.stream_reply(request()).await.unwrap())
            .await
            .unwrap();

        assert_eq!(one, "first");
        assert_eq!(two, "second, in two parts");
        assert_eq!(three, "first");
    }

    #[tokio::test]
    async fn test_failure_scripts() {
        let client = MockChatClient::new()
            .with_connect_failure()
            .with_failure_after(&["partial "]);

        assert!(client.stream_reply(request()).await.is_err());

        let stream = client.stream_reply(request()).await.unwrap();
        assert!(drain(stream).await.is_err());
    }

    #[tokio::test]
    async fn test_requests_are_captured_in_order() {
        let client = MockChatClient::new();

        let mut req = request();
        req.system = "alpha".to_string();
        drain(client.stream_reply(req).await.unwrap()).await.unwrap();

        let mut req = request();
        req.system = "beta".to_string();
        drain(client.stream_reply(req).await.unwrap()).await.unwrap();

        let captured = client.captured_requests();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].system, "alpha");
        assert_eq!(captured[1].system, "beta");
    }
}
