//! Streaming runs: engine events reduced to `token`, `message`,
//! `node_update` and `error` frames, always closed by `[DONE]`.

pub mod assembler;
pub mod classify;
pub mod envelope;
pub mod reducer;
pub mod tokens;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, instrument, warn};

use switchboard_core::errors::GraphError;
use switchboard_core::events::{NodeDelta, NodeUpdate, INTERRUPT_NODE};
use switchboard_core::graph::{AgentGraph, StreamMode};
use switchboard_core::messages::{ChatMessage, ChatMessageType};

use crate::run::PreparedRun;
use assembler::{assemble, Assembled};
use classify::{classify, classify_custom, EventKind};
use envelope::{Disconnected, Frame, FrameSink};
use reducer::{interrupt_candidates, node_update_info, NodeRoles};

pub use envelope::{sse_body_stream, sse_response, DONE_FRAME};

const STREAM_MODES: [StreamMode; 3] = [StreamMode::Updates, StreamMode::Messages, StreamMode::Custom];

#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    pub stream_tokens: bool,
    pub stream_node_updates: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            stream_tokens: true,
            stream_node_updates: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

/// Drive one run and write its frames to `sink`. Engine failures and panics
/// become an `error` frame; `[DONE]` is written last unless the client is
/// already gone.
#[instrument(skip_all, fields(run_id = %run.config.run_id, thread_id = %run.config.thread_id))]
pub async fn message_generator(
    graph: Arc<dyn AgentGraph>,
    run: PreparedRun,
    options: StreamOptions,
    roles: NodeRoles,
    sink: FrameSink,
) {
    let outcome = AssertUnwindSafe(reduce(graph.as_ref(), run, options, &roles, &sink))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(StreamError::Disconnected(_))) => {
            debug!("client disconnected, stream stopped");
            return;
        }
        Ok(Err(StreamError::Graph(e))) => {
            error!(error = %e, "error in message generator");
            if sink.send(&Frame::Error("Internal server error".into())).await.is_err() {
                return;
            }
        }
        Err(_) => {
            error!("message generator panicked");
            if sink.send(&Frame::Error("Internal server error".into())).await.is_err() {
                return;
            }
        }
    }
    let _ = sink.done().await;
}

async fn reduce(
    graph: &dyn AgentGraph,
    run: PreparedRun,
    options: StreamOptions,
    roles: &NodeRoles,
    sink: &FrameSink,
) -> Result<(), StreamError> {
    let run_id = run.config.run_id.clone();
    let mut events = graph.stream(run.input, run.config, &STREAM_MODES).await?;

    loop {
        // Frames are not written for every event, so a gone client has to be
        // noticed while waiting upstream as well.
        let event = tokio::select! {
            biased;
            _ = sink.closed() => return Err(Disconnected.into()),
            next = events.next() => match next {
                Some(event) => event,
                None => break,
            },
        };
        let mut candidates = Vec::new();

        for kind in classify(event?) {
            match kind {
                EventKind::NodeUpdates(updates) => {
                    if options.stream_node_updates {
                        for update in &updates {
                            sink.send(&Frame::NodeUpdate(node_update_info(update, &run_id)))
                                .await?;
                        }
                    }
                    candidates.extend(updates.iter().flat_map(|u| roles.candidates(u)));
                }
                EventKind::Interrupt(pending) => {
                    if options.stream_node_updates {
                        let update = NodeUpdate {
                            node: INTERRUPT_NODE.to_string(),
                            delta: NodeDelta::Interrupts(pending.clone()),
                        };
                        sink.send(&Frame::NodeUpdate(node_update_info(&update, &run_id)))
                            .await?;
                    }
                    candidates.extend(interrupt_candidates(&pending));
                }
                EventKind::Custom(payload) => candidates.push(classify_custom(payload)),
                EventKind::TokenDelta { chunk, metadata } => {
                    if !options.stream_tokens {
                        continue;
                    }
                    if let Some(text) = tokens::token_text(&chunk, &metadata) {
                        sink.send(&Frame::Token(text)).await?;
                    }
                }
                EventKind::Values => {}
            }
        }

        for assembled in assemble(candidates) {
            let converted = assembled.and_then(|a| match a {
                Assembled::Message(message) => Ok(ChatMessage::from(&message)),
                Assembled::Opaque(payload) => ChatMessage::from_custom(&payload),
            });
            let message = match converted {
                Ok(message) => message.with_run_id(&run_id),
                Err(e) => {
                    warn!(error = %e, "error parsing message");
                    sink.send(&Frame::Error("Unexpected error".into())).await?;
                    continue;
                }
            };
            if message.kind == ChatMessageType::Human && message.content == run.message {
                continue;
            }
            sink.send(&Frame::Message(message)).await?;
        }
    }
    Ok(())
}
