//! Sorting engine output into the shapes the reducer handles.

use serde_json::Value;

use switchboard_core::events::{ChunkMetadata, GraphEvent, Interrupt, NodeDelta, NodeUpdate};
use switchboard_core::messages::Message;

/// What one engine event means to the stream.
#[derive(Debug)]
pub enum EventKind {
    /// Per-node deltas, without the interrupt marker.
    NodeUpdates(Vec<NodeUpdate>),
    Interrupt(Vec<Interrupt>),
    TokenDelta {
        chunk: Message,
        metadata: ChunkMetadata,
    },
    Custom(Value),
    /// Full-state snapshots carry nothing new for the stream.
    Values,
}

/// Split an event into tagged parts. An updates event carrying the interrupt
/// marker yields the interrupt after the ordinary node updates.
pub fn classify(event: GraphEvent) -> Vec<EventKind> {
    match event {
        GraphEvent::Updates(updates) => {
            let (interrupts, nodes): (Vec<_>, Vec<_>) =
                updates.into_iter().partition(NodeUpdate::is_interrupt);
            let mut kinds = Vec::new();
            if !nodes.is_empty() {
                kinds.push(EventKind::NodeUpdates(nodes));
            }
            for update in interrupts {
                let pending = match update.delta {
                    NodeDelta::Interrupts(pending) => pending,
                    NodeDelta::State(_) => Vec::new(),
                };
                kinds.push(EventKind::Interrupt(pending));
            }
            kinds
        }
        GraphEvent::Messages { chunk, metadata } => vec![EventKind::TokenDelta { chunk, metadata }],
        GraphEvent::Custom(payload) => vec![EventKind::Custom(payload)],
        GraphEvent::Values(_) => vec![EventKind::Values],
    }
}

/// A message-to-be, before fragment assembly.
#[derive(Clone, Debug, PartialEq)]
pub enum Candidate {
    /// One `(field, value)` piece of a message still being assembled.
    Fragment(String, Value),
    Message(Message),
    /// An arbitrary payload, surfaced as a custom message.
    Opaque(Value),
}

const MESSAGE_TYPES: [&str; 5] = ["human", "ai", "ai_chunk", "tool", "system"];

/// Classify a custom payload. Two-element arrays headed by a string are
/// fragments, objects typed like a message are parsed as one, anything else is
/// passed through opaque.
pub fn classify_custom(payload: Value) -> Candidate {
    if let Value::Array(items) = &payload {
        if let [Value::String(field), value] = items.as_slice() {
            return Candidate::Fragment(field.clone(), value.clone());
        }
    }
    let is_message = payload
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| MESSAGE_TYPES.contains(&t));
    if is_message {
        if let Ok(message) = serde_json::from_value::<Message>(payload.clone()) {
            return Candidate::Message(message);
        }
    }
    Candidate::Opaque(payload)
}
