use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConversionError;
use crate::ids::RunId;

// --- Engine-side messages ---

/// A message as it lives in graph state and flows through the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Human(HumanMessage),
    Ai(AiMessage),
    /// Incremental piece of an assistant message, only seen on the token stream.
    AiChunk(AiMessage),
    Tool(ToolMessage),
    System(SystemMessage),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanMessage {
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiMessage {
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub response_metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub content: MessageContent,
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub id: Option<String>,
}

/// Either plain text or a list of provider content parts
/// (`{"type": "text", "text": ...}`, `{"type": "tool_use", ...}`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl MessageContent {
    /// Flatten to a string: bare string parts and `text` parts are concatenated,
    /// everything else is dropped.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                        obj.get("text").and_then(Value::as_str)
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Strip `tool_use` parts, which carry tool-call arguments rather than
    /// user-visible text.
    pub fn without_tool_calls(&self) -> Self {
        match self {
            Self::Text(text) => Self::Text(text.clone()),
            Self::Parts(parts) => Self::Parts(
                parts
                    .iter()
                    .filter(|part| part.get("type").and_then(Value::as_str) != Some("tool_use"))
                    .cloned()
                    .collect(),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

// --- Convenience constructors ---

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human(HumanMessage {
            content: MessageContent::Text(text.into()),
            id: None,
        })
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Message::Ai(AiMessage::text(text))
    }

    pub fn ai_chunk(text: impl Into<String>) -> Self {
        Message::AiChunk(AiMessage::text(text))
    }

    pub fn tool(
        text: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Message::Tool(ToolMessage {
            content: MessageContent::Text(text.into()),
            tool_call_id: tool_call_id.into(),
            name,
            id: None,
        })
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            content: MessageContent::Text(text.into()),
            id: None,
        })
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            Self::Human(m) => &m.content,
            Self::Ai(m) | Self::AiChunk(m) => &m.content,
            Self::Tool(m) => &m.content,
            Self::System(m) => &m.content,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Human(m) => m.id.as_deref(),
            Self::Ai(m) | Self::AiChunk(m) => m.id.as_deref(),
            Self::Tool(m) => m.id.as_deref(),
            Self::System(m) => m.id.as_deref(),
        }
    }

    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Human(_) => "human",
            Self::Ai(_) => "ai",
            Self::AiChunk(_) => "ai_chunk",
            Self::Tool(_) => "tool",
            Self::System(_) => "system",
        }
    }

    /// Complete or streamed AI output.
    pub fn is_ai(&self) -> bool {
        matches!(self, Self::Ai(_) | Self::AiChunk(_))
    }
}

impl AiMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(text.into()),
            ..Default::default()
        }
    }
}

// --- Client-facing messages ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    Human,
    Ai,
    Tool,
    System,
    Custom,
}

/// The message shape returned by `/invoke`, `/history` and `message` stream frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: ChatMessageType,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub response_metadata: Map<String, Value>,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
}

impl ChatMessage {
    fn empty(kind: ChatMessageType, content: String) -> Self {
        Self {
            kind,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            run_id: None,
            response_metadata: Map::new(),
            custom_data: Map::new(),
        }
    }

    /// Wrap an opaque custom payload. Only JSON objects are accepted.
    pub fn from_custom(payload: &Value) -> Result<Self, ConversionError> {
        match payload {
            Value::Object(obj) => {
                let mut msg = Self::empty(ChatMessageType::Custom, String::new());
                msg.custom_data = obj.clone();
                Ok(msg)
            }
            other => Err(ConversionError::UnsupportedPayload(json_type_name(other))),
        }
    }

    pub fn with_run_id(mut self, run_id: &RunId) -> Self {
        self.run_id = Some(run_id.clone());
        self
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::Human(m) => Self::empty(ChatMessageType::Human, m.content.to_text()),
            Message::Ai(m) | Message::AiChunk(m) => {
                let mut msg = Self::empty(ChatMessageType::Ai, m.content.to_text());
                msg.tool_calls = m.tool_calls.clone();
                msg.response_metadata = m.response_metadata.clone();
                msg
            }
            Message::Tool(m) => {
                let mut msg = Self::empty(ChatMessageType::Tool, m.content.to_text());
                msg.tool_call_id = Some(m.tool_call_id.clone());
                msg.name = m.name.clone();
                msg
            }
            Message::System(m) => Self::empty(ChatMessageType::System, m.content.to_text()),
        }
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
