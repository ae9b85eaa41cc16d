use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use switchboard_core::config::RunConfig;
use switchboard_core::errors::GraphError;
use switchboard_core::events::{ChunkMetadata, GraphEvent, GraphState, StateDelta};
use switchboard_core::graph::StreamMode;
use switchboard_core::messages::Message;

/// What a node produced for one step.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeOutput {
    Update(StateDelta),
    /// Pause the run. The node is re-run with the resume value when the
    /// thread is resumed.
    Interrupt(Value),
}

/// One step of a pipeline.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, GraphError>;
}

/// Mode-filtered sender for run events. A closed receiver surfaces as
/// [`GraphError::Cancelled`].
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<Result<GraphEvent, GraphError>>,
    modes: Arc<[StreamMode]>,
}

impl EventSink {
    pub(crate) fn new(
        tx: mpsc::Sender<Result<GraphEvent, GraphError>>,
        modes: &[StreamMode],
    ) -> Self {
        Self {
            tx,
            modes: modes.into(),
        }
    }

    pub(crate) fn wants(&self, mode: StreamMode) -> bool {
        self.modes.contains(&mode)
    }

    pub(crate) async fn send(&self, event: GraphEvent) -> Result<(), GraphError> {
        if !StreamMode::admits(&self.modes, &event) {
            return Ok(());
        }
        self.tx.send(Ok(event)).await.map_err(|_| GraphError::Cancelled)
    }

    pub(crate) async fn fail(&self, error: GraphError) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Per-step handle given to a node.
pub struct NodeContext {
    node: String,
    config: RunConfig,
    resume: Option<Value>,
    sink: EventSink,
}

impl NodeContext {
    pub(crate) fn new(node: &str, config: RunConfig, resume: Option<Value>, sink: EventSink) -> Self {
        Self {
            node: node.to_string(),
            config,
            resume,
            sink,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Value the client answered a previous interrupt of this node with.
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref()
    }

    /// True when token chunks would reach the consumer.
    pub fn streams_tokens(&self) -> bool {
        self.sink.wants(StreamMode::Messages)
    }

    /// Publish a token-level chunk tagged with this node.
    pub async fn emit_token(&self, chunk: Message) -> Result<(), GraphError> {
        self.sink
            .send(GraphEvent::Messages {
                chunk,
                metadata: ChunkMetadata::for_node(&self.node),
            })
            .await
    }

    /// Publish an arbitrary payload on the custom channel.
    pub async fn emit_custom(&self, payload: Value) -> Result<(), GraphError> {
        self.sink.send(GraphEvent::Custom(payload)).await
    }
}
