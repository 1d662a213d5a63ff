//! Database schema for the harvest index

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per (dataset, target), overwritten by the latest attempt
CREATE TABLE IF NOT EXISTS targets (
    kind TEXT NOT NULL,
    target_key TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    status TEXT NOT NULL,
    attempts INTEGER,
    last_status INTEGER,
    error_message TEXT,
    artifact_path TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (kind, target_key)
);

CREATE INDEX IF NOT EXISTS idx_targets_status ON targets(status);
CREATE INDEX IF NOT EXISTS idx_targets_run ON targets(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
