//! Linear graph runtime: nodes run one after another over a shared state,
//! with a checkpoint after every step.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use switchboard_core::checkpoint::{Checkpoint, Checkpointer};
use switchboard_core::config::RunConfig;
use switchboard_core::errors::GraphError;
use switchboard_core::events::{
    GraphEvent, GraphState, Interrupt, NodeUpdate, StateDelta, StateValue, INTERRUPT_NODE,
};
use switchboard_core::graph::{
    AgentGraph, GraphEventStream, GraphInput, PendingTask, StateSnapshot, StreamMode,
};
use switchboard_core::messages::Message;

use crate::error::EngineError;
use crate::node::{EventSink, Node, NodeContext, NodeOutput};

const EVENT_CHANNEL_SIZE: usize = 64;

pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<Arc<dyn Node>>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<Self, EngineError> {
        if nodes.is_empty() {
            return Err(EngineError::EmptyPipeline);
        }
        let mut seen = HashSet::new();
        for node in &nodes {
            if node.name() == INTERRUPT_NODE {
                return Err(EngineError::ReservedNode(node.name().to_string()));
            }
            if !seen.insert(node.name().to_string()) {
                return Err(EngineError::DuplicateNode(node.name().to_string()));
            }
        }
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                nodes,
                checkpointer,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.inner.nodes.iter().map(|n| n.name()).collect()
    }
}

/// Merge a delta into the state. Messages with an id already present are
/// replaced in place, others appended. Opaque values have no stored form and
/// are not persisted.
pub fn apply_delta(state: &mut GraphState, delta: &StateDelta) {
    if let Some(messages) = &delta.messages {
        for message in messages {
            let existing = message
                .id()
                .and_then(|id| state.messages.iter().position(|m| m.id() == Some(id)));
            match existing {
                Some(idx) => state.messages[idx] = message.clone(),
                None => state.messages.push(message.clone()),
            }
        }
    }
    for (key, value) in &delta.values {
        if let StateValue::Json(v) = value {
            state.values.insert(key.clone(), v.clone());
        }
    }
}

impl Inner {
    fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    async fn save(
        &self,
        config: &RunConfig,
        state: &GraphState,
        next_node: Option<&str>,
        pending_interrupts: Vec<Interrupt>,
    ) -> Result<(), GraphError> {
        self.checkpointer
            .put(&Checkpoint {
                thread_id: config.thread_id.clone(),
                state: state.clone(),
                next_node: next_node.map(str::to_string),
                pending_interrupts,
            })
            .await
    }

    #[instrument(skip_all, fields(graph = %self.name, run_id = %config.run_id, thread_id = %config.thread_id))]
    async fn run(&self, input: GraphInput, config: RunConfig, sink: EventSink) -> Result<(), GraphError> {
        let checkpoint = self.checkpointer.get(&config.thread_id).await?;

        let (mut state, start, mut resume) = match input {
            GraphInput::Messages(messages) => {
                // A fresh message discards any pending interrupt.
                let mut state = checkpoint.map(|c| c.state).unwrap_or_default();
                apply_delta(&mut state, &StateDelta::messages(with_ids(messages)));
                self.save(&config, &state, Some(self.nodes[0].name()), Vec::new())
                    .await?;
                (state, 0, None)
            }
            GraphInput::Resume(value) => {
                let Some(cp) = checkpoint.filter(Checkpoint::is_interrupted) else {
                    return Err(GraphError::InvalidInput(
                        "thread has no pending interrupt to resume".into(),
                    ));
                };
                let start = cp
                    .next_node
                    .as_deref()
                    .and_then(|n| self.position(n))
                    .ok_or_else(|| {
                        GraphError::Checkpoint(format!("unknown resume node {:?}", cp.next_node))
                    })?;
                (cp.state, start, Some(value))
            }
        };

        for (idx, node) in self.nodes.iter().enumerate().skip(start) {
            let name = node.name();
            debug!(node = name, "running node");
            let ctx = NodeContext::new(name, config.clone(), resume.take(), sink.clone());

            match node.run(&state, &ctx).await? {
                NodeOutput::Update(delta) => {
                    apply_delta(&mut state, &delta);
                    let next = self.nodes.get(idx + 1).map(|n| n.name());
                    self.save(&config, &state, next, Vec::new()).await?;
                    sink.send(GraphEvent::Updates(vec![NodeUpdate::state(name, delta)]))
                        .await?;
                    sink.send(GraphEvent::Values(state.clone())).await?;
                }
                NodeOutput::Interrupt(value) => {
                    let interrupts = vec![Interrupt {
                        value,
                        id: Some(Uuid::new_v4().to_string()),
                    }];
                    self.save(&config, &state, Some(name), interrupts.clone()).await?;
                    info!(node = name, "run interrupted");
                    sink.send(GraphEvent::interrupt(interrupts)).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Give id-less messages a fresh id so later deltas can replace them.
fn with_ids(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut m| {
            let id = match &mut m {
                Message::Human(h) => &mut h.id,
                Message::Ai(a) | Message::AiChunk(a) => &mut a.id,
                Message::Tool(t) => &mut t.id,
                Message::System(s) => &mut s.id,
            };
            if id.is_none() {
                *id = Some(Uuid::new_v4().to_string());
            }
            m
        })
        .collect()
}

#[async_trait]
impl AgentGraph for Pipeline {
    async fn get_state(&self, config: &RunConfig) -> Result<StateSnapshot, GraphError> {
        let Some(cp) = self.inner.checkpointer.get(&config.thread_id).await? else {
            return Ok(StateSnapshot::default());
        };
        let tasks = cp
            .next_node
            .iter()
            .map(|name| PendingTask {
                name: name.clone(),
                interrupts: cp.pending_interrupts.clone(),
            })
            .collect();
        Ok(StateSnapshot {
            values: cp.state,
            tasks,
        })
    }

    async fn stream(
        &self,
        input: GraphInput,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<GraphEventStream, GraphError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let sink = EventSink::new(tx, modes);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let run = std::panic::AssertUnwindSafe(inner.run(input, config, sink.clone()))
                .catch_unwind()
                .await;
            match run {
                Ok(Ok(())) => {}
                Ok(Err(GraphError::Cancelled)) => debug!("consumer went away, run stopped"),
                Ok(Err(e)) => {
                    warn!(error = %e, "graph run failed");
                    sink.fail(e).await;
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(panic = %message, "graph run panicked");
                    sink.fail(GraphError::NodeFailed {
                        node: "unknown".into(),
                        message,
                    })
                    .await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Convenience node built from a closure over the state.
pub struct FnNode<F> {
    name: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&GraphState, Option<&Value>) -> Result<NodeOutput, GraphError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&GraphState, Option<&Value>) -> Result<NodeOutput, GraphError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, GraphError> {
        (self.f)(state, ctx.resume_value())
    }
}
