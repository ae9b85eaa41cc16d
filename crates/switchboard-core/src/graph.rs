use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::config::RunConfig;
use crate::errors::GraphError;
use crate::events::{GraphEvent, GraphState, Interrupt};
use crate::messages::Message;

pub type GraphEventStream = Pin<Box<dyn Stream<Item = Result<GraphEvent, GraphError>> + Send>>;

/// What a run starts from.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphInput {
    /// Append these messages to the thread and run from the start.
    Messages(Vec<Message>),
    /// Answer the pending interrupt of the thread.
    Resume(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    Updates,
    Messages,
    Custom,
    Values,
}

impl StreamMode {
    pub const ALL: [StreamMode; 4] = [
        StreamMode::Updates,
        StreamMode::Messages,
        StreamMode::Custom,
        StreamMode::Values,
    ];

    pub fn admits(modes: &[StreamMode], event: &GraphEvent) -> bool {
        let mode = match event {
            GraphEvent::Updates(_) => StreamMode::Updates,
            GraphEvent::Messages { .. } => StreamMode::Messages,
            GraphEvent::Custom(_) => StreamMode::Custom,
            GraphEvent::Values(_) => StreamMode::Values,
        };
        modes.contains(&mode)
    }
}

/// A step that has not completed yet.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTask {
    pub name: String,
    pub interrupts: Vec<Interrupt>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    pub values: GraphState,
    pub tasks: Vec<PendingTask>,
}

impl StateSnapshot {
    /// True when some pending task is paused on an interrupt.
    pub fn is_awaiting_resume(&self) -> bool {
        self.tasks.iter().any(|t| !t.interrupts.is_empty())
    }
}

/// The execution engine contract the service consumes.
#[async_trait]
pub trait AgentGraph: Send + Sync {
    async fn get_state(&self, config: &RunConfig) -> Result<StateSnapshot, GraphError>;

    /// Start a run; events are yielded in order and the run stops when the
    /// returned stream is dropped.
    async fn stream(
        &self,
        input: GraphInput,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<GraphEventStream, GraphError>;

    /// Run to completion and collect every event.
    async fn invoke(
        &self,
        input: GraphInput,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<Vec<GraphEvent>, GraphError> {
        let mut stream = self.stream(input, config, modes).await?;
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}
