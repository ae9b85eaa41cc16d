//! Scripted [`AgentGraph`] for exercising consumers without running nodes.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use switchboard_core::config::RunConfig;
use switchboard_core::errors::GraphError;
use switchboard_core::events::GraphEvent;
use switchboard_core::graph::{
    AgentGraph, GraphEventStream, GraphInput, StateSnapshot, StreamMode,
};

/// One recorded call to [`AgentGraph::stream`].
#[derive(Clone, Debug)]
pub struct RecordedRun {
    pub input: GraphInput,
    pub config: RunConfig,
    pub modes: Vec<StreamMode>,
}

/// Replays a fixed event script on every run. Mode filtering is not applied;
/// the script is yielded as written.
#[derive(Default)]
pub struct ScriptedGraph {
    events: Vec<GraphEvent>,
    snapshot: StateSnapshot,
    start_error: Option<GraphError>,
    stream_error: Option<GraphError>,
    state_error: Option<GraphError>,
    runs: Mutex<Vec<RecordedRun>>,
}

impl ScriptedGraph {
    pub fn new(events: Vec<GraphEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Snapshot returned by `get_state`.
    pub fn with_snapshot(mut self, snapshot: StateSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Fail the `stream` call before any event.
    pub fn failing_start(mut self, error: GraphError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Yield this error after the scripted events.
    pub fn failing_after_events(mut self, error: GraphError) -> Self {
        self.stream_error = Some(error);
        self
    }

    pub fn failing_state(mut self, error: GraphError) -> Self {
        self.state_error = Some(error);
        self
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

#[async_trait]
impl AgentGraph for ScriptedGraph {
    async fn get_state(&self, _config: &RunConfig) -> Result<StateSnapshot, GraphError> {
        match &self.state_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.snapshot.clone()),
        }
    }

    async fn stream(
        &self,
        input: GraphInput,
        config: RunConfig,
        modes: &[StreamMode],
    ) -> Result<GraphEventStream, GraphError> {
        self.runs.lock().push(RecordedRun {
            input,
            config,
            modes: modes.to_vec(),
        });
        if let Some(e) = &self.start_error {
            return Err(e.clone());
        }

        let mut items: Vec<Result<GraphEvent, GraphError>> =
            self.events.iter().cloned().map(Ok).collect();
        if let Some(e) = &self.stream_error {
            items.push(Err(e.clone()));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
