use async_trait::async_trait;
use dashmap::DashMap;

use switchboard_core::checkpoint::{Checkpoint, Checkpointer};
use switchboard_core::errors::GraphError;
use switchboard_core::ids::ThreadId;

/// Process-local checkpointer keeping only the latest checkpoint per thread.
/// Used for `DATABASE_TYPE=memory` and in tests.
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: DashMap<ThreadId, Checkpoint>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, GraphError> {
        Ok(self.threads.get(thread_id).map(|cp| cp.value().clone()))
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), GraphError> {
        self.threads
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }
}
