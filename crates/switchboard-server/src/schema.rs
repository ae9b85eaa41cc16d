//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use switchboard_core::messages::ChatMessage;
use switchboard_engine::AgentInfo;

fn default_true() -> bool {
    true
}

/// Body of `/invoke`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UserInput {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_config: Map<String, Value>,
}

/// Body of `/stream`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StreamInput {
    #[serde(flatten)]
    pub input: UserInput,
    #[serde(default = "default_true")]
    pub stream_tokens: bool,
    #[serde(default = "default_true")]
    pub stream_node_updates: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Feedback {
    pub run_id: String,
    pub key: String,
    pub score: f64,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FeedbackResponse {
    pub status: String,
}

impl FeedbackResponse {
    pub fn success() -> Self {
        Self {
            status: "success".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatHistoryInput {
    pub thread_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceMetadata {
    pub agents: Vec<AgentInfo>,
    pub default_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_input_defaults_to_streaming_everything() {
        let input: StreamInput = serde_json::from_value(json!({"message": "hi"})).unwrap();
        assert_eq!(input.input.message, "hi");
        assert!(input.stream_tokens);
        assert!(input.stream_node_updates);
        assert!(input.input.agent_config.is_empty());
    }

    #[test]
    fn stream_input_flags() {
        let input: StreamInput = serde_json::from_value(json!({
            "message": "hi",
            "thread_id": "t-1",
            "stream_tokens": false,
            "agent_config": {"temperature": 0.1}
        }))
        .unwrap();
        assert!(!input.stream_tokens);
        assert!(input.stream_node_updates);
        assert_eq!(input.input.thread_id.as_deref(), Some("t-1"));
        assert_eq!(input.input.agent_config["temperature"], 0.1);
    }

    #[test]
    fn feedback_kwargs_optional() {
        let fb: Feedback =
            serde_json::from_value(json!({"run_id": "r", "key": "human-feedback-stars", "score": 0.8}))
                .unwrap();
        assert!(fb.kwargs.is_empty());
        assert_eq!(
            serde_json::to_value(FeedbackResponse::success()).unwrap(),
            json!({"status": "success"})
        );
    }
}
