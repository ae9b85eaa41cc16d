//! Non-streaming runs: execute to completion and return one message.

use tracing::{error, instrument};

use switchboard_core::events::{GraphEvent, NodeDelta};
use switchboard_core::graph::{AgentGraph, StreamMode};
use switchboard_core::messages::ChatMessage;

use crate::error::ServiceError;
use crate::run::PreparedRun;
use crate::stream::reducer::interrupt_message;

const INVOKE_MODES: [StreamMode; 2] = [StreamMode::Updates, StreamMode::Values];

#[instrument(skip_all, fields(run_id = %run.config.run_id, thread_id = %run.config.thread_id))]
pub async fn invoke(graph: &dyn AgentGraph, run: PreparedRun) -> Result<ChatMessage, ServiceError> {
    let run_id = run.config.run_id.clone();
    let events = graph
        .invoke(run.input, run.config, &INVOKE_MODES)
        .await
        .inspect_err(|e| error!(error = %e, "invoke failed"))?;
    let message = final_message(events.last())?;
    Ok(message.with_run_id(&run_id))
}

/// Interpret the terminal event of a run.
pub fn final_message(last: Option<&GraphEvent>) -> Result<ChatMessage, ServiceError> {
    match last {
        Some(GraphEvent::Values(state)) => state
            .messages
            .last()
            .map(ChatMessage::from)
            .ok_or_else(|| ServiceError::UnexpectedResponseShape("values without messages".into())),
        Some(GraphEvent::Updates(updates)) => {
            let first = updates.iter().find(|u| u.is_interrupt()).and_then(|u| match &u.delta {
                NodeDelta::Interrupts(interrupts) => interrupts.first(),
                NodeDelta::State(_) => None,
            });
            match first {
                Some(interrupt) => Ok(ChatMessage::from(&interrupt_message(&interrupt.value))),
                None => Err(ServiceError::UnexpectedResponseShape("updates".into())),
            }
        }
        Some(other) => Err(ServiceError::UnexpectedResponseShape(other.kind().into())),
        None => Err(ServiceError::UnexpectedResponseShape("no events".into())),
    }
}
