use super::client::GeminiHttpClient;
use super::types::{
    default_safety_settings, Content, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, InlineData, Part,
};
use crate::ai::{ChatStreamService, ReplyStream, TurnRequest};
use crate::models::{Message, Speaker};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

// Sampling parameters fixed for every turn.
const TEMPERATURE: f32 = 0.5;
const TOP_K: u32 = 1;
const TOP_P: f32 = 1.0;
const MAX_OUTPUT_TOKENS: u32 = 1000;

pub struct GeminiChatClient {
    http: GeminiHttpClient,
}

impl GeminiChatClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, reqwest::Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, model, timeout, client),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn content_for_message(message: &Message) -> Content {
        let role = match message.speaker {
            Speaker::User => "user",
            Speaker::Assistant => "model",
        };

        let mut parts = vec![Part::Text {
            text: message.text.clone(),
        }];
        if let Some(image) = &message.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            });
        }

        Content {
            role: Some(role.to_string()),
            parts,
        }
    }

    fn build_request(request: &TurnRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::Text {
                    text: request.system.clone(),
                }],
            }),
            contents: request
                .history
                .iter()
                .map(Self::content_for_message)
                .collect(),
            generation_config: Some(GenerationConfig {
                temperature: TEMPERATURE,
                top_k: TOP_K,
                top_p: TOP_P,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            }),
            safety_settings: default_safety_settings(),
        }
    }

    fn chunk_text(chunk: &GenerateContentResponse) -> String {
        chunk
            .candidates
            .iter()
            .flat_map(|candidate| candidate.content.parts.iter())
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatStreamService for GeminiChatClient {
    async fn stream_reply(&self, request: TurnRequest) -> Result<ReplyStream> {
        tracing::debug!(
            "Streaming Gemini reply over {} history turns",
            request.history.len()
        );

        let payload = Self::build_request(&request);
        let response = self.http.stream_generate_content(&payload).await?;

        // Server-sent events: one `data: {json}` line per chunk. Lines are
        // split manually because chunks can arrive fragmented mid-line.
        let stream = async_stream::try_stream! {
            let mut byte_stream = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();

            while let Some(bytes) = byte_stream.next().await {
                let bytes = bytes?;
                buf.extend_from_slice(&bytes);

                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let data = match line.trim().strip_prefix("data:") {
                        Some(data) => data,
                        None => continue,
                    };

                    let chunk: GenerateContentResponse = serde_json::from_str(data.trim())
                        .map_err(|e| {
                            Error::AiProvider(format!("Failed to parse Gemini stream chunk: {}", e))
                        })?;

                    let text = Self::chunk_text(&chunk);
                    if !text.is_empty() {
                        yield text;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachedImage;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEFAULT_MODEL: &str = "gemini-1.5-flash";

    fn make_client(server: &MockServer, api_key: &str, model: &str) -> GeminiChatClient {
        GeminiChatClient::new(
            api_key.to_string(),
            model.to_string(),
            Duration::from_secs(5),
        )
        .with_base_url(server.uri())
    }

    fn turn(history: Vec<Message>) -> TurnRequest {
        TurnRequest {
            system: "You are a test assistant.".to_string(),
            history,
        }
    }

    fn sse_body(chunks: &[String]) -> String {
        chunks
            .iter()
            .map(|chunk| format!("data: {}\n\n", chunk))
            .collect()
    }

    fn text_chunk(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] }
            }]
        })
        .to_string()
    }

    async fn collect_text(stream: ReplyStream) -> Result<String> {
        let fragments: Vec<String> = stream.try_collect().await?;
        Ok(fragments.concat())
    }

    #[tokio::test]
    async fn test_stream_reply_concatenates_chunks() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(
                "/v1beta/models/gemini-1.5-flash:streamGenerateContent",
            ))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse_body(&[text_chunk("Eat "), text_chunk("your "), text_chunk("greens.")]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key", DEFAULT_MODEL);
        let stream = client
            .stream_reply(turn(vec![Message::user("What should I eat?")]))
            .await
            .unwrap();

        assert_eq!(collect_text(stream).await.unwrap(), "Eat your greens.");
    }

    #[tokio::test]
    async fn test_stream_reply_handles_crlf_frames_and_empty_chunks() {
        let server = MockServer::start().await;

        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\n",
            text_chunk("Hello"),
            serde_json::json!({ "candidates": [] })
        );

        Mock::given(method("POST"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key", DEFAULT_MODEL);
        let stream = client
            .stream_reply(turn(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(collect_text(stream).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_request_carries_fixed_parameters_and_safety_settings() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("\"temperature\":0.5"))
            .and(body_string_contains("\"topK\":1"))
            .and(body_string_contains("\"maxOutputTokens\":1000"))
            .and(body_string_contains("HARM_CATEGORY_DANGEROUS_CONTENT"))
            .and(body_string_contains("BLOCK_MEDIUM_AND_ABOVE"))
            .and(body_string_contains("system_instruction"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse_body(&[text_chunk("ok")]),
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key", DEFAULT_MODEL);
        let stream = client
            .stream_reply(turn(vec![Message::user("hello")]))
            .await
            .unwrap();
        collect_text(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_history_roles_and_image_parts_are_translated() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("\"role\":\"model\""))
            .and(body_string_contains("\"role\":\"user\""))
            .and(body_string_contains("\"inlineData\""))
            .and(body_string_contains("\"mimeType\":\"image/png\""))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse_body(&[text_chunk("looks healthy")]),
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let history = vec![
            Message::assistant("Hi there!"),
            Message::user_with_image(
                "What is this?",
                AttachedImage {
                    mime_type: "image/png".to_string(),
                    data: "iVBORw0KGgo=".to_string(),
                },
            ),
        ];

        let client = make_client(&server, "test-key", DEFAULT_MODEL);
        let stream = client.stream_reply(turn(history)).await.unwrap();
        collect_text(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_returns_ai_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = make_client(&server, "bad-key", DEFAULT_MODEL);
        let err = client
            .stream_reply(turn(vec![Message::user("hi")]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::AiProvider(_)));
    }

    #[tokio::test]
    async fn test_malformed_chunk_surfaces_as_stream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: not json\n\n".to_string(),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key", DEFAULT_MODEL);
        let stream = client
            .stream_reply(turn(vec![Message::user("hi")]))
            .await
            .unwrap();

        let err = collect_text(stream).await.unwrap_err();
        assert!(matches!(err, Error::AiProvider(_)));
    }

    #[tokio::test]
    async fn test_model_id_strips_models_prefix() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(
                "/v1beta/models/gemini-1.5-flash:streamGenerateContent",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse_body(&[text_chunk("ok")]),
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key", "models/gemini-1.5-flash");
        let stream = client
            .stream_reply(turn(vec![Message::user("hi")]))
            .await
            .unwrap();
        collect_text(stream).await.unwrap();
    }
}
