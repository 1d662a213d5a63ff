//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, TargetKind, TargetRecord, TargetStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the index at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

const TARGET_COLUMNS: &str =
    "kind, target_key, status, attempts, last_status, error_message, artifact_path, updated_at";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Option<TargetRecord>> {
    let kind = TargetKind::from_db_string(&row.get::<_, String>(0)?);
    let status = TargetStatus::from_db_string(&row.get::<_, String>(2)?);
    let (Some(kind), Some(status)) = (kind, status) else {
        return Ok(None);
    };

    Ok(Some(TargetRecord {
        kind,
        key: row.get(1)?,
        status,
        attempts: row.get(3)?,
        last_status: row.get(4)?,
        error_message: row.get(5)?,
        artifact_path: row.get(6)?,
        updated_at: row.get(7)?,
    }))
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Target Tracking =====

    fn record_target(&mut self, run_id: i64, record: &TargetRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO targets
                (kind, target_key, run_id, status, attempts, last_status, error_message, artifact_path, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(kind, target_key) DO UPDATE SET
                run_id = excluded.run_id,
                status = excluded.status,
                attempts = excluded.attempts,
                last_status = excluded.last_status,
                error_message = excluded.error_message,
                artifact_path = excluded.artifact_path,
                updated_at = excluded.updated_at",
            params![
                record.kind.to_db_string(),
                record.key,
                run_id,
                record.status.to_db_string(),
                record.attempts,
                record.last_status,
                record.error_message,
                record.artifact_path,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_target(&self, kind: TargetKind, key: &str) -> StorageResult<Option<TargetRecord>> {
        let target = self
            .conn
            .query_row(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE kind = ?1 AND target_key = ?2"),
                params![kind.to_db_string(), key],
                target_from_row,
            )
            .optional()?
            .flatten();
        Ok(target)
    }

    fn get_targets_by_status(&self, status: TargetStatus) -> StorageResult<Vec<TargetRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets WHERE status = ?1 ORDER BY kind, target_key"
        ))?;

        let mut targets = Vec::new();
        for row in stmt.query_map(params![status.to_db_string()], target_from_row)? {
            if let Some(target) = row? {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    // ===== Statistics =====

    fn count_targets(&self) -> StorageResult<Vec<(TargetKind, TargetStatus, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, status, COUNT(*) FROM targets GROUP BY kind, status")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (kind, status, count) = row?;
            if let (Some(kind), Some(status)) =
                (TargetKind::from_db_string(&kind), TargetStatus::from_db_string(&status))
            {
                counts.push((kind, status, count as u64));
            }
        }
        counts.sort();
        Ok(counts)
    }

    fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
