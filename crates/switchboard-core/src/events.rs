use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::Message;

/// Reserved node name under which pending interrupts are reported.
pub const INTERRUPT_NODE: &str = "__interrupt__";

/// One event produced by an agent graph run, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// Per-node state deltas from one step.
    Updates(Vec<NodeUpdate>),
    /// Token-level output of a chat model call inside a node.
    Messages {
        chunk: Message,
        metadata: ChunkMetadata,
    },
    /// Arbitrary payload written by a node.
    Custom(Value),
    /// Full state after a step.
    Values(GraphState),
}

impl GraphEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Updates(_) => "updates",
            Self::Messages { .. } => "messages",
            Self::Custom(_) => "custom",
            Self::Values(_) => "values",
        }
    }

    pub fn interrupt(interrupts: Vec<Interrupt>) -> Self {
        Self::Updates(vec![NodeUpdate {
            node: INTERRUPT_NODE.to_string(),
            delta: NodeDelta::Interrupts(interrupts),
        }])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeUpdate {
    pub node: String,
    pub delta: NodeDelta,
}

impl NodeUpdate {
    pub fn state(node: impl Into<String>, delta: StateDelta) -> Self {
        Self {
            node: node.into(),
            delta: NodeDelta::State(Some(delta)),
        }
    }

    pub fn is_interrupt(&self) -> bool {
        self.node == INTERRUPT_NODE
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeDelta {
    /// `None` when the node ran but wrote nothing.
    State(Option<StateDelta>),
    Interrupts(Vec<Interrupt>),
}

impl NodeDelta {
    pub fn has_updates(&self) -> bool {
        match self {
            Self::State(Some(delta)) => !delta.is_empty(),
            Self::State(None) => false,
            Self::Interrupts(interrupts) => !interrupts.is_empty(),
        }
    }
}

/// Keys a node wrote during one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateDelta {
    pub messages: Option<Vec<Message>>,
    pub values: BTreeMap<String, StateValue>,
}

impl StateDelta {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: StateValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// True when no key was written. An empty message list still counts as a
    /// write.
    pub fn is_empty(&self) -> bool {
        self.messages.is_none() && self.values.is_empty()
    }
}

/// A state value as seen by observers. Runtime objects that have no JSON
/// form are reported by type name only.
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    Json(Value),
    Opaque { type_name: String },
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMetadata {
    pub tags: Vec<String>,
    pub node: Option<String>,
}

impl ChunkMetadata {
    pub const SKIP_STREAM: &'static str = "skip_stream";

    pub fn for_node(node: impl Into<String>) -> Self {
        Self {
            tags: Vec::new(),
            node: Some(node.into()),
        }
    }

    pub fn skip_stream(&self) -> bool {
        self.tags.iter().any(|t| t == Self::SKIP_STREAM)
    }
}

/// Full conversation state of a thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub values: Map<String, Value>,
}
