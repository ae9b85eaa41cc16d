/// SQL DDL for the checkpoint database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Checkpoints are append-only; the highest `sequence` per thread is current.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    next_node TEXT,
    state TEXT NOT NULL,
    interrupts TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_checkpoints_thread_seq ON checkpoints(thread_id, sequence);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
