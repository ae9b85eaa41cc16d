use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::instrument;

use switchboard_core::errors::ModelError;
use switchboard_core::messages::Message;
use switchboard_core::provider::{ChatModel, ChatOptions, ModelEvent, ModelEventStream};

use crate::sse::{self, ChunkParser};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// `None` leaves the client unconfigured; every call then fails.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub default_model: String,
}

/// Streaming client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    pub fn request_body(&self, messages: &[Message], options: &ChatOptions) -> Value {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let mut body = json!({
            "model": model,
            "messages": convert_messages(messages),
            "stream": true,
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = options.max_tokens {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

/// Map conversation messages onto chat-completions roles. Streaming chunks
/// never reach the model and are skipped.
pub fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Human(h) => Some(json!({"role": "user", "content": h.content.to_text()})),
            Message::System(s) => Some(json!({"role": "system", "content": s.content.to_text()})),
            Message::Ai(a) => {
                let mut v = json!({"role": "assistant", "content": a.content.to_text()});
                if !a.tool_calls.is_empty() {
                    v["tool_calls"] = a
                        .tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {"name": c.name, "arguments": c.args.to_string()},
                            })
                        })
                        .collect();
                }
                Some(v)
            }
            Message::Tool(t) => Some(json!({
                "role": "tool",
                "tool_call_id": t.tool_call_id,
                "content": t.content.to_text(),
            })),
            Message::AiChunk(_) => None,
        })
        .collect()
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, messages, options), fields(model = ?options.model))]
    async fn stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ModelEventStream, ModelError> {
        let Some(api_key) = &self.config.api_key else {
            return Err(ModelError::NotConfigured);
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .header("accept", "text/event-stream")
            .json(&self.request_body(messages, options))
            .send()
            .await
            .map_err(|e| ModelError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, body));
        }

        Ok(Box::pin(SseStream::new(resp.bytes_stream())))
    }
}

/// Wraps a byte stream from reqwest and yields model events.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: ChunkParser,
    buffer: String,
    pending: VecDeque<Result<ModelEvent, ModelError>>,
    ended: bool,
}

impl SseStream {
    fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: ChunkParser::new(),
            buffer: String::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    fn feed(&mut self, chunk: &str) {
        for data in sse::parse_sse_data(chunk) {
            match self.parser.parse_data(&data) {
                Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.ended = true;
                    return;
                }
            }
        }
    }
}

impl Stream for SseStream {
    type Item = Result<ModelEvent, ModelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Poll::Ready(Some(ev));
            }
            if self.ended || self.parser.is_finished() {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.buffer.push_str(&text);

                    // Process complete SSE events from the buffer
                    while !self.ended {
                        let Some(pos) = self.buffer.find("\n\n") else {
                            break;
                        };
                        let chunk: String = self.buffer.drain(..pos + 2).collect();
                        self.feed(&chunk);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.ended = true;
                    return Poll::Ready(Some(Err(ModelError::StreamInterrupted(e.to_string()))));
                }
                Poll::Ready(None) => {
                    let remaining = std::mem::take(&mut self.buffer);
                    if !remaining.is_empty() {
                        self.feed(&remaining);
                    }
                    if let Some(done) = self.parser.finish() {
                        self.pending.push_back(Ok(done));
                    }
                    self.ended = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, key: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            api_key: key.map(SecretString::from),
            base_url,
            default_model: "gpt-4o-mini".into(),
        }
    }

    fn sse_body(tokens: &[&str]) -> String {
        let mut body = String::new();
        for t in tokens {
            let chunk = json!({"id": "c1", "model": "gpt-4o-mini", "choices": [{"delta": {"content": t}}]});
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn streams_tokens_then_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["Hello", " there"])),
            )
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(config(format!("{}/v1", server.uri()), Some("sk-test")));
        let mut stream = model
            .stream(&[Message::human("hi")], &ChatOptions::default())
            .await
            .unwrap();

        let mut deltas = String::new();
        let mut final_text = None;
        while let Some(ev) = stream.next().await {
            match ev.unwrap() {
                ModelEvent::TextDelta(d) => deltas.push_str(&d),
                ModelEvent::Done(msg) => final_text = Some(msg.content.to_text()),
            }
        }
        assert_eq!(deltas, "Hello there");
        assert_eq!(final_text.as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let model = OpenAiChatModel::new(config("http://127.0.0.1:1".into(), None));
        assert!(!model.is_configured());
        let err = model
            .stream(&[Message::human("hi")], &ChatOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::NotConfigured));
    }

    #[tokio::test]
    async fn http_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(config(server.uri(), Some("sk-test")));
        let err = model
            .stream(&[Message::human("hi")], &ChatOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::RateLimited));
    }

    #[test]
    fn request_body_uses_model_override() {
        let model = OpenAiChatModel::new(config("http://x".into(), Some("k")));
        let opts = ChatOptions {
            model: Some("gpt-4o".into()),
            temperature: Some(0.5),
            ..Default::default()
        };
        let body = model.request_body(
            &[Message::system("be brief"), Message::human("hi"), Message::ai_chunk("x")],
            &opts,
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }
}
