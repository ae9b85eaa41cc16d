use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GraphError;
use crate::events::{GraphState, Interrupt};
use crate::ids::ThreadId;

/// Saved progress of one thread: its state and, when paused, where to resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: ThreadId,
    pub state: GraphState,
    /// Node to run next when the thread resumes.
    #[serde(default)]
    pub next_node: Option<String>,
    #[serde(default)]
    pub pending_interrupts: Vec<Interrupt>,
}

impl Checkpoint {
    pub fn new(thread_id: ThreadId, state: GraphState) -> Self {
        Self {
            thread_id,
            state,
            next_node: None,
            pending_interrupts: Vec::new(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        !self.pending_interrupts.is_empty()
    }
}

/// Persistence for thread checkpoints. Only the latest checkpoint per thread
/// is read back.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, GraphError>;
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), GraphError>;
}
