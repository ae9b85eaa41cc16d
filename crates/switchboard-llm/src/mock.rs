use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use switchboard_core::errors::ModelError;
use switchboard_core::messages::{AiMessage, Message};
use switchboard_core::provider::{ChatModel, ChatOptions, ModelEvent, ModelEventStream};

/// Pre-programmed reply for deterministic tests without API calls.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Stream these text deltas, then the concatenated message.
    Tokens(Vec<String>),
    /// Fail the `stream()` call itself.
    Error(ModelError),
    /// Stream the deltas, then fail mid-stream.
    Interrupted(Vec<String>, ModelError),
}

impl MockReply {
    pub fn tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self::Tokens(tokens.iter().map(|t| t.as_ref().to_string()).collect())
    }

    pub fn text(text: &str) -> Self {
        Self::Tokens(vec![text.to_string()])
    }
}

/// Chat model that pops replies in order. Once the script is exhausted it
/// echoes the last human message.
pub struct MockChatModel {
    replies: Mutex<VecDeque<MockReply>>,
    call_count: AtomicUsize,
    last_model: Mutex<Option<String>>,
}

impl MockChatModel {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            call_count: AtomicUsize::new(0),
            last_model: Mutex::new(None),
        }
    }

    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Model requested by the most recent call (`None` means the default).
    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().clone()
    }
}

fn events_for(tokens: Vec<String>) -> Vec<Result<ModelEvent, ModelError>> {
    let full: String = tokens.concat();
    let mut events: Vec<_> = tokens
        .into_iter()
        .map(|t| Ok(ModelEvent::TextDelta(t)))
        .collect();
    events.push(Ok(ModelEvent::Done(AiMessage::text(full))));
    events
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ModelEventStream, ModelError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_model.lock() = options.model.clone();

        let reply = self.replies.lock().pop_front();
        let events = match reply {
            Some(MockReply::Tokens(tokens)) => events_for(tokens),
            Some(MockReply::Error(e)) => return Err(e),
            Some(MockReply::Interrupted(tokens, e)) => {
                let mut events: Vec<_> = tokens
                    .into_iter()
                    .map(|t| Ok(ModelEvent::TextDelta(t)))
                    .collect();
                events.push(Err(e));
                events
            }
            None => {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| matches!(m, Message::Human(_)))
                    .map(|m| m.content().to_text())
                    .unwrap_or_default();
                events_for(vec![last])
            }
        };
        Ok(Box::pin(stream::iter(events)))
    }
}
