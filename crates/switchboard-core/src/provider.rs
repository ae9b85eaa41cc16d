use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::ModelError;
use crate::messages::{AiMessage, Message};

/// Streaming output of one chat-model call.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    Done(AiMessage),
}

pub type ModelEventStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

#[derive(Clone, Debug, Default)]
pub struct ChatOptions {
    /// Overrides the client's default model.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;

    async fn stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ModelEventStream, ModelError>;
}
