use serde_json::Value;
use tracing::debug;

use switchboard_core::config::RunConfig;
use switchboard_core::graph::{AgentGraph, GraphInput};
use switchboard_core::ids::ThreadId;
use switchboard_core::messages::Message;

use crate::error::ServiceError;
use crate::schema::UserInput;

/// Everything needed to start one run.
#[derive(Clone, Debug)]
pub struct PreparedRun {
    pub config: RunConfig,
    pub input: GraphInput,
    /// The raw user message, used to drop the engine's echo of it.
    pub message: String,
}

/// Build the run config for a request. Reserved-key clashes are rejected
/// here, before the engine is touched.
pub fn run_config(input: &UserInput) -> Result<RunConfig, ServiceError> {
    let thread_id = input.thread_id.clone().map(ThreadId::from_raw);
    Ok(RunConfig::new(thread_id)
        .with_model(input.model.clone())
        .with_user_id(input.user_id.clone())
        .with_extra(input.agent_config.clone())?)
}

/// Pick the run input: a resume when the thread is paused on an interrupt,
/// otherwise a fresh human message.
pub async fn prepare_run(
    graph: &dyn AgentGraph,
    config: RunConfig,
    message: &str,
) -> Result<PreparedRun, ServiceError> {
    let snapshot = graph.get_state(&config).await?;
    let input = if snapshot.is_awaiting_resume() {
        debug!(thread_id = %config.thread_id, "resuming interrupted thread");
        GraphInput::Resume(Value::String(message.to_string()))
    } else {
        GraphInput::Messages(vec![Message::human(message)])
    };
    Ok(PreparedRun {
        config,
        input,
        message: message.to_string(),
    })
}
