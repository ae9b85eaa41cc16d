//! Folding `(field, value)` fragments into whole assistant messages.

use serde_json::{Map, Value};

use switchboard_core::errors::ConversionError;
use switchboard_core::messages::{AiMessage, Message};

use super::classify::Candidate;

/// Fields an assembled assistant message accepts. Others are dropped.
const MESSAGE_FIELDS: [&str; 5] = ["content", "tool_calls", "id", "name", "response_metadata"];

/// Fields collected so far for one message in progress.
#[derive(Debug, Default)]
pub struct PartialMessage {
    fields: Map<String, Value>,
}

impl PartialMessage {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Later values for the same field win.
    pub fn push(&mut self, field: String, value: Value) {
        self.fields.insert(field, value);
    }

    /// Turn the collected fields into an assistant message.
    pub fn flush(&mut self) -> Result<Message, ConversionError> {
        let fields: Map<String, Value> = std::mem::take(&mut self.fields)
            .into_iter()
            .filter(|(k, _)| MESSAGE_FIELDS.contains(&k.as_str()))
            .collect();
        let message: AiMessage = serde_json::from_value(Value::Object(fields))
            .map_err(|e| ConversionError::Malformed(e.to_string()))?;
        Ok(Message::Ai(message))
    }
}

/// A candidate after assembly: no fragments remain.
#[derive(Clone, Debug, PartialEq)]
pub enum Assembled {
    Message(Message),
    Opaque(Value),
}

/// Assemble candidates in order. Consecutive fragments become one message,
/// flushed before the next whole candidate and at the end of the list.
pub fn assemble(candidates: Vec<Candidate>) -> Vec<Result<Assembled, ConversionError>> {
    let mut out = Vec::with_capacity(candidates.len());
    let mut partial = PartialMessage::default();

    for candidate in candidates {
        match candidate {
            Candidate::Fragment(field, value) => partial.push(field, value),
            Candidate::Message(message) => {
                flush_into(&mut partial, &mut out);
                out.push(Ok(Assembled::Message(message)));
            }
            Candidate::Opaque(value) => {
                flush_into(&mut partial, &mut out);
                out.push(Ok(Assembled::Opaque(value)));
            }
        }
    }
    flush_into(&mut partial, &mut out);
    out
}

fn flush_into(partial: &mut PartialMessage, out: &mut Vec<Result<Assembled, ConversionError>>) {
    if !partial.is_empty() {
        out.push(partial.flush().map(Assembled::Message));
    }
}
