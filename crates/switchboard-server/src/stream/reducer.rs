//! Node deltas to candidate messages and `node_update` diagnostics.

use serde::Serialize;
use serde_json::{json, Map, Value};

use switchboard_core::events::{Interrupt, NodeDelta, NodeUpdate, StateDelta, StateValue};
use switchboard_core::ids::RunId;
use switchboard_core::messages::{AiMessage, Message, MessageContent};

use super::classify::Candidate;

/// Node-name conventions of multi-agent graphs.
#[derive(Clone, Debug)]
pub struct NodeRoles {
    /// Re-echoes the whole conversation; only its last AI message is new.
    pub supervisor: String,
    /// Their replies are shown as tool results rather than assistant turns.
    pub sub_agents: Vec<String>,
}

impl Default for NodeRoles {
    fn default() -> Self {
        Self {
            supervisor: "supervisor".into(),
            sub_agents: vec!["research_expert".into(), "math_expert".into()],
        }
    }
}

impl NodeRoles {
    /// Candidate messages contributed by one node update.
    pub fn candidates(&self, update: &NodeUpdate) -> Vec<Candidate> {
        let messages: Vec<Message> = match &update.delta {
            NodeDelta::State(Some(delta)) => delta.messages.clone().unwrap_or_default(),
            NodeDelta::State(None) => Vec::new(),
            NodeDelta::Interrupts(pending) => {
                return interrupt_candidates(pending);
            }
        };

        let messages = if update.node == self.supervisor {
            match messages.iter().rposition(Message::is_ai) {
                Some(last) => vec![messages[last].clone()],
                None => messages,
            }
        } else if self.sub_agents.contains(&update.node) {
            messages
                .first()
                .map(|first| {
                    let text = first.content().to_text();
                    vec![Message::tool(text, "", Some(update.node.clone()))]
                })
                .unwrap_or_default()
        } else {
            messages
        };

        messages.into_iter().map(Candidate::Message).collect()
    }
}

pub fn interrupt_candidates(pending: &[Interrupt]) -> Vec<Candidate> {
    pending
        .iter()
        .map(|i| Candidate::Message(interrupt_message(&i.value)))
        .collect()
}

/// An interrupt as shown to clients: an AI message whose content is the
/// interrupt value. Non-string values are JSON-encoded.
pub fn interrupt_message(value: &Value) -> Message {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Message::Ai(AiMessage::text(text))
}

#[derive(Serialize)]
struct NodeUpdateInfo<'a> {
    node: &'a str,
    has_updates: bool,
    updates: Value,
    run_id: &'a RunId,
}

/// Content of a `node_update` frame.
pub fn node_update_info(update: &NodeUpdate, run_id: &RunId) -> Value {
    let info = NodeUpdateInfo {
        node: &update.node,
        has_updates: update.delta.has_updates(),
        updates: simplify(&update.delta),
        run_id,
    };
    serde_json::to_value(&info).unwrap_or_else(|e| {
        tracing::warn!(node = %update.node, error = %e, "error while serializing node update");
        fallback_info(update, run_id)
    })
}

pub fn fallback_info(update: &NodeUpdate, run_id: &RunId) -> Value {
    json!({
        "node": update.node,
        "has_updates": update.delta.has_updates(),
        "error": "Could not serialize node updates",
        "run_id": run_id,
    })
}

/// JSON-safe summary of a node delta: messages flattened to `{type, content}`,
/// JSON values passed through, runtime objects replaced by a type tag.
pub fn simplify(delta: &NodeDelta) -> Value {
    match delta {
        NodeDelta::State(None) => json!({}),
        NodeDelta::State(Some(delta)) => simplify_state(delta),
        NodeDelta::Interrupts(pending) => {
            json!({ "value": pending.iter().map(|i| i.value.clone()).collect::<Vec<_>>() })
        }
    }
}

fn simplify_state(delta: &StateDelta) -> Value {
    let mut out = Map::new();
    if let Some(messages) = &delta.messages {
        let flat: Vec<Value> = messages
            .iter()
            .map(|m| json!({"type": simple_type(m), "content": simple_content(m.content())}))
            .collect();
        out.insert("messages".into(), Value::Array(flat));
    }
    for (key, value) in &delta.values {
        let value = match value {
            StateValue::Json(v) => v.clone(),
            StateValue::Opaque { type_name } => Value::String(format!("[Complex data: {type_name}]")),
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}

fn simple_type(message: &Message) -> &'static str {
    match message {
        Message::AiChunk(_) => "ai",
        other => other.kind(),
    }
}

/// Text parts joined with spaces.
fn simple_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}
