//! `text/event-stream` framing of stream output.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use switchboard_core::messages::ChatMessage;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// One outbound frame, serialized as `{"type": ..., "content": ...}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Frame {
    Token(String),
    Message(ChatMessage),
    NodeUpdate(Value),
    Error(String),
}

impl Frame {
    pub fn encode(&self) -> Bytes {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize stream frame");
            json!({"type": "error", "content": "Unexpected error"}).to_string()
        });
        Bytes::from(format!("data: {json}\n\n"))
    }
}

/// The client went away; the producer should stop.
#[derive(Debug, thiserror::Error)]
#[error("stream consumer disconnected")]
pub struct Disconnected;

/// Producer half of an SSE body.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), Disconnected> {
        self.tx.send(frame.encode()).await.map_err(|_| Disconnected)
    }

    /// Resolves once the consumer has dropped the body.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub async fn done(&self) -> Result<(), Disconnected> {
        self.tx
            .send(Bytes::from_static(DONE_FRAME.as_bytes()))
            .await
            .map_err(|_| Disconnected)
    }
}

pub fn sse_body_stream(rx: mpsc::Receiver<Bytes>) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>)
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::messages::Message;

    fn decode(bytes: &Bytes) -> Value {
        let text = std::str::from_utf8(bytes).unwrap();
        let json = text.strip_prefix("data: ").unwrap().strip_suffix("\n\n").unwrap();
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn frames_are_tagged() {
        assert_eq!(
            decode(&Frame::Token("Hel".into()).encode()),
            json!({"type": "token", "content": "Hel"})
        );
        assert_eq!(
            decode(&Frame::Error("Internal server error".into()).encode()),
            json!({"type": "error", "content": "Internal server error"})
        );
        let msg = decode(&Frame::Message(ChatMessage::from(&Message::ai("hi"))).encode());
        assert_eq!(msg["type"], "message");
        assert_eq!(msg["content"]["type"], "ai");
        assert_eq!(msg["content"]["content"], "hi");
        assert_eq!(
            decode(&Frame::NodeUpdate(json!({"node": "search"})).encode())["type"],
            "node_update"
        );
    }

    #[tokio::test]
    async fn closed_receiver_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        let sink = FrameSink::new(tx);
        drop(rx);
        assert!(sink.send(&Frame::Token("x".into())).await.is_err());
        assert!(sink.done().await.is_err());
    }

    #[tokio::test]
    async fn done_frame_is_literal() {
        let (tx, mut rx) = mpsc::channel(1);
        FrameSink::new(tx).done().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"data: [DONE]\n\n"));
    }
}
