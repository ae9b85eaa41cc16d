use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;
use uuid::Uuid;

use switchboard_core::checkpoint::{Checkpoint, Checkpointer};
use switchboard_core::errors::GraphError;
use switchboard_core::events::{GraphState, Interrupt};
use switchboard_core::ids::ThreadId;

use crate::database::Database;
use crate::error::StoreError;

/// SQLite-backed checkpoint history, one row per saved step.
#[derive(Clone)]
pub struct CheckpointRepo {
    db: Database,
}

impl CheckpointRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a checkpoint after the thread's current head.
    #[instrument(skip(self, checkpoint), fields(thread_id = %checkpoint.thread_id))]
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<i64, StoreError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let interrupts = serde_json::to_string(&checkpoint.pending_interrupts)?;
        self.db.with_conn(|conn| {
            let sequence: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM checkpoints WHERE thread_id = ?1",
                [checkpoint.thread_id.as_str()],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO checkpoints (id, thread_id, sequence, next_node, state, interrupts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    Uuid::now_v7().to_string(),
                    checkpoint.thread_id.as_str(),
                    sequence,
                    checkpoint.next_node,
                    state,
                    interrupts,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(sequence)
        })
    }

    /// Most recent checkpoint of a thread.
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub fn latest(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, StoreError> {
        let row = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT next_node, state, interrupts FROM checkpoints
                     WHERE thread_id = ?1 ORDER BY sequence DESC LIMIT 1",
                    [thread_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        let Some((next_node, state, interrupts)) = row else {
            return Ok(None);
        };
        let state: GraphState = serde_json::from_str(&state)?;
        let pending_interrupts: Vec<Interrupt> = serde_json::from_str(&interrupts)?;
        Ok(Some(Checkpoint {
            thread_id: thread_id.clone(),
            state,
            next_node,
            pending_interrupts,
        }))
    }

    /// Number of checkpoints stored for a thread.
    pub fn count(&self, thread_id: &ThreadId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1",
                [thread_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

#[async_trait]
impl Checkpointer for CheckpointRepo {
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, GraphError> {
        let repo = self.clone();
        let thread_id = thread_id.clone();
        let result = tokio::task::spawn_blocking(move || repo.latest(&thread_id))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?;
        Ok(result?)
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), GraphError> {
        let repo = self.clone();
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || repo.save(&checkpoint))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::messages::Message;

    fn repo() -> CheckpointRepo {
        CheckpointRepo::new(Database::in_memory().unwrap())
    }

    fn state(messages: Vec<Message>) -> GraphState {
        GraphState {
            messages,
            ..Default::default()
        }
    }

    #[test]
    fn latest_of_unknown_thread_is_none() {
        assert!(repo().latest(&ThreadId::from_raw("nope")).unwrap().is_none());
    }

    #[test]
    fn save_appends_and_latest_wins() {
        let repo = repo();
        let tid = ThreadId::from_raw("t-1");

        let first = Checkpoint::new(tid.clone(), state(vec![Message::human("hi")]));
        assert_eq!(repo.save(&first).unwrap(), 1);

        let mut second = Checkpoint::new(
            tid.clone(),
            state(vec![Message::human("hi"), Message::ai("hello")]),
        );
        second.next_node = Some("suggest".into());
        second.pending_interrupts.push(Interrupt {
            value: json!("continue?"),
            id: None,
        });
        assert_eq!(repo.save(&second).unwrap(), 2);

        let latest = repo.latest(&tid).unwrap().unwrap();
        assert_eq!(latest, second);
        assert_eq!(repo.count(&tid).unwrap(), 2);
    }

    #[test]
    fn threads_are_isolated() {
        let repo = repo();
        repo.save(&Checkpoint::new(ThreadId::from_raw("a"), state(vec![Message::human("a")])))
            .unwrap();
        repo.save(&Checkpoint::new(ThreadId::from_raw("b"), state(vec![Message::human("b")])))
            .unwrap();

        let a = repo.latest(&ThreadId::from_raw("a")).unwrap().unwrap();
        assert_eq!(a.state.messages, vec![Message::human("a")]);
        assert_eq!(repo.count(&ThreadId::from_raw("b")).unwrap(), 1);
    }

    #[tokio::test]
    async fn checkpointer_trait_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = CheckpointRepo::new(Database::open(&dir.path().join("cp.db")).unwrap());
        let tid = ThreadId::from_raw("t-async");

        let cp = Checkpoint::new(tid.clone(), state(vec![Message::human("hello")]));
        Checkpointer::put(&repo, &cp).await.unwrap();

        let loaded = Checkpointer::get(&repo, &tid).await.unwrap().unwrap();
        assert_eq!(loaded.state.messages.len(), 1);
    }
}
