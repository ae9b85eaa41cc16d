use serde::Deserialize;
use serde_json::{Map, Value};

use switchboard_core::errors::ModelError;
use switchboard_core::messages::{AiMessage, MessageContent, ToolCall};
use switchboard_core::provider::ModelEvent;

/// Sentinel payload that ends an OpenAI-style completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// State machine folding `chat.completion.chunk` payloads into text deltas and
/// one final assistant message.
#[derive(Default)]
pub struct ChunkParser {
    text: String,
    tool_calls: Vec<ToolAccum>,
    id: Option<String>,
    model: Option<String>,
    finish_reason: Option<String>,
    finished: bool,
}

#[derive(Default)]
struct ToolAccum {
    id: Option<String>,
    name: String,
    arguments_json: String,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Parse the data of one SSE event and return zero or more events.
    pub fn parse_data(&mut self, data: &str) -> Result<Vec<ModelEvent>, ModelError> {
        if self.finished {
            return Ok(Vec::new());
        }
        if data.trim() == DONE_SENTINEL {
            return Ok(self.finish().into_iter().collect());
        }

        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable completion chunk");
                return Ok(Vec::new());
            }
        };
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("stream error")
                .to_string();
            return Err(ModelError::StreamInterrupted(message));
        }

        let chunk: CompletionChunk = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };
        if self.id.is_none() {
            self.id = chunk.id;
        }
        if self.model.is_none() {
            self.model = chunk.model;
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                self.text.push_str(&text);
                events.push(ModelEvent::TextDelta(text));
            }
            for call in choice.delta.tool_calls {
                while self.tool_calls.len() <= call.index {
                    self.tool_calls.push(ToolAccum::default());
                }
                let slot = &mut self.tool_calls[call.index];
                if call.id.is_some() {
                    slot.id = call.id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        slot.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        slot.arguments_json.push_str(&args);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        Ok(events)
    }

    /// Emit the final message once. Later calls return `None`.
    pub fn finish(&mut self) -> Option<ModelEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(ModelEvent::Done(self.build_message()))
    }

    fn build_message(&self) -> AiMessage {
        let tool_calls = self
            .tool_calls
            .iter()
            .map(|t| ToolCall {
                name: t.name.clone(),
                args: serde_json::from_str(&t.arguments_json)
                    .unwrap_or_else(|_| Value::String(t.arguments_json.clone())),
                id: t.id.clone(),
            })
            .collect();

        let mut response_metadata = Map::new();
        if let Some(model) = &self.model {
            response_metadata.insert("model_name".into(), Value::String(model.clone()));
        }
        if let Some(reason) = &self.finish_reason {
            response_metadata.insert("finish_reason".into(), Value::String(reason.clone()));
        }

        AiMessage {
            content: MessageContent::Text(self.text.clone()),
            tool_calls,
            id: self.id.clone(),
            name: None,
            response_metadata,
        }
    }
}

/// Extract the `data:` payloads of complete SSE events in `raw`. Multi-line
/// data is joined with newlines; comments and other fields are ignored.
pub fn parse_sse_data(raw: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            match current.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(data);
                }
                None => current = Some(data.to_string()),
            }
        } else if line.is_empty() {
            if let Some(buf) = current.take() {
                events.push(buf);
            }
        }
    }

    if let Some(buf) = current {
        events.push(buf);
    }
    events
}

// --- Deserialization types for completion chunks ---

#[derive(Deserialize)]
struct CompletionChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_chunk(text: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
        })
        .to_string()
    }

    #[test]
    fn parse_simple_text_stream() {
        let mut parser = ChunkParser::new();
        let mut deltas = Vec::new();
        for t in ["The", " weather", " is", " sunny"] {
            for ev in parser.parse_data(&text_chunk(t)).unwrap() {
                if let ModelEvent::TextDelta(d) = ev {
                    deltas.push(d);
                }
            }
        }
        let done = parser.parse_data("[DONE]").unwrap();
        assert_eq!(deltas.concat(), "The weather is sunny");
        match &done[..] {
            [ModelEvent::Done(msg)] => {
                assert_eq!(msg.content.to_text(), "The weather is sunny");
                assert_eq!(msg.id.as_deref(), Some("chatcmpl-1"));
                assert_eq!(msg.response_metadata["model_name"], "gpt-4o-mini");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parser.parse_data("[DONE]").unwrap().is_empty());
    }

    #[test]
    fn tool_call_arguments_accumulate() {
        let mut parser = ChunkParser::new();
        let first = serde_json::json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "function": {"name": "search", "arguments": "{\"q\":"}}
        ]}}]});
        let second = serde_json::json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "\"tokyo\"}"}}
        ]}, "finish_reason": "tool_calls"}]});

        assert!(parser.parse_data(&first.to_string()).unwrap().is_empty());
        assert!(parser.parse_data(&second.to_string()).unwrap().is_empty());

        let Some(ModelEvent::Done(msg)) = parser.finish() else {
            panic!("expected done");
        };
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "search");
        assert_eq!(msg.tool_calls[0].args["q"], "tokyo");
        assert_eq!(msg.response_metadata["finish_reason"], "tool_calls");
    }

    #[test]
    fn error_payload_is_an_error() {
        let mut parser = ChunkParser::new();
        let err = parser
            .parse_data(r#"{"error": {"message": "overloaded"}}"#)
            .unwrap_err();
        assert!(matches!(err, ModelError::StreamInterrupted(m) if m == "overloaded"));
    }

    #[test]
    fn parse_sse_data_blocks() {
        let raw = ": keep-alive\n\ndata: {\"a\":1}\n\ndata: line1\ndata: line2\n\ndata: [DONE]";
        assert_eq!(
            parse_sse_data(raw),
            vec!["{\"a\":1}".to_string(), "line1\nline2".into(), "[DONE]".into()]
        );
    }
}
