//! Four-step research pipeline: reformulate the question, look up documents,
//! answer with the chat model, then offer follow-up suggestions.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use switchboard_core::checkpoint::Checkpointer;
use switchboard_core::errors::{GraphError, ModelError};
use switchboard_core::events::{GraphState, StateDelta};
use switchboard_core::messages::{AiMessage, Message};
use switchboard_core::provider::{ChatModel, ChatOptions, ModelEvent};

use crate::error::EngineError;
use crate::node::{Node, NodeContext, NodeOutput};
use crate::pipeline::Pipeline;

pub const NAME: &str = "research-assistant";
pub const DESCRIPTION: &str = "A research assistant with web search and calculator.";

pub fn build(
    model: Arc<dyn ChatModel>,
    checkpointer: Arc<dyn Checkpointer>,
) -> Result<Pipeline, EngineError> {
    Pipeline::new(
        NAME,
        vec![
            Arc::new(ReformulateQuery),
            Arc::new(Search),
            Arc::new(Chatbot { model }),
            Arc::new(Suggest),
        ],
        checkpointer,
    )
}

fn last_human_text(state: &GraphState) -> String {
    state
        .messages
        .iter()
        .rev()
        .find_map(|m| match m {
            Message::Human(h) => Some(h.content.to_text()),
            _ => None,
        })
        .unwrap_or_default()
}

struct ReformulateQuery;

#[async_trait]
impl Node for ReformulateQuery {
    fn name(&self) -> &str {
        "reformulate_query"
    }

    async fn run(&self, state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, GraphError> {
        let query = last_human_text(state).trim().to_string();
        Ok(NodeOutput::Update(
            StateDelta::default().with_value("reformulated_query", json!(query).into()),
        ))
    }
}

/// Document lookup. No search backend is wired in; it returns placeholder
/// documents so downstream steps see the usual state shape.
struct Search;

#[async_trait]
impl Node for Search {
    fn name(&self) -> &str {
        "search"
    }

    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, GraphError> {
        Ok(NodeOutput::Update(
            StateDelta::default().with_value("docs", json!(["doc1", "doc2", "doc3"]).into()),
        ))
    }
}

struct Chatbot {
    model: Arc<dyn ChatModel>,
}

#[async_trait]
impl Node for Chatbot {
    fn name(&self) -> &str {
        "chatbot"
    }

    #[instrument(skip_all, fields(provider = self.model.name(), model = ?ctx.config().model))]
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, GraphError> {
        let options = ChatOptions {
            model: ctx.config().model.clone(),
            ..Default::default()
        };
        let mut stream = self.model.stream(&state.messages, &options).await?;

        let mut reply: Option<AiMessage> = None;
        while let Some(event) = stream.next().await {
            match event? {
                ModelEvent::TextDelta(delta) => {
                    if ctx.streams_tokens() {
                        ctx.emit_token(Message::ai_chunk(delta)).await?;
                    }
                }
                ModelEvent::Done(message) => reply = Some(message),
            }
        }

        let mut reply = reply.ok_or_else(|| {
            ModelError::StreamInterrupted("stream ended without a final message".into())
        })?;
        if reply.id.is_none() {
            reply.id = Some(Uuid::new_v4().to_string());
        }
        debug!(chars = reply.content.to_text().len(), "chatbot replied");
        Ok(NodeOutput::Update(StateDelta::messages(vec![Message::Ai(reply)])))
    }
}

struct Suggest;

#[async_trait]
impl Node for Suggest {
    fn name(&self) -> &str {
        "suggest"
    }

    async fn run(&self, state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, GraphError> {
        let topic = state
            .values
            .get("reformulated_query")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let suggestions = if topic.is_empty() {
            json!([])
        } else {
            json!([
                format!("Tell me more about {topic}"),
                format!("What are the sources on {topic}?"),
                format!("Summarize {topic} in one sentence"),
            ])
        };
        Ok(NodeOutput::Update(
            StateDelta::default().with_value("suggestions", suggestions.into()),
        ))
    }
}
