//! SQLite checkpoint store.
//!
//! Implements `CheckpointStore` from `planweave-core` with sqlx. State and
//! pending-interrupt payloads are stored as JSON text, timestamps as
//! RFC 3339 strings; `put` upserts by thread id.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use planweave_core::checkpoint::CheckpointStore;
use planweave_types::checkpoint::{Checkpoint, CheckpointError, PendingInterrupt};

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Connect and ensure the schema exists. `url` is an sqlx SQLite URL
    /// (e.g. `sqlite:///var/lib/planweave/checkpoints.db?mode=rwc`).
    pub async fn connect(url: &str) -> Result<Self, CheckpointError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .map_err(|e| CheckpointError::Store(e.to_string()))?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                pending_interrupt TEXT,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&pool)
        .await
        .map_err(|e| CheckpointError::Store(e.to_string()))?;

        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint, CheckpointError> {
    let thread_id: String = row
        .try_get("thread_id")
        .map_err(|e| CheckpointError::Store(e.to_string()))?;
    let state_text: String = row
        .try_get("state")
        .map_err(|e| CheckpointError::Store(e.to_string()))?;
    let pending_text: Option<String> = row
        .try_get("pending_interrupt")
        .map_err(|e| CheckpointError::Store(e.to_string()))?;
    let updated_text: String = row
        .try_get("updated_at")
        .map_err(|e| CheckpointError::Store(e.to_string()))?;

    let state = serde_json::from_str(&state_text)
        .map_err(|e| CheckpointError::Serialization(format!("invalid state JSON: {e}")))?;
    let pending_interrupt: Option<PendingInterrupt> = match pending_text {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
            CheckpointError::Serialization(format!("invalid pending interrupt JSON: {e}"))
        })?),
        None => None,
    };
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CheckpointError::Serialization(format!("invalid datetime: {e}")))?;

    Ok(Checkpoint {
        thread_id,
        state,
        pending_interrupt,
        updated_at,
    })
}

// ---------------------------------------------------------------------------
// CheckpointStore implementation
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let state_text = serde_json::to_string(&checkpoint.state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let pending_text = match &checkpoint.pending_interrupt {
            Some(pending) => Some(
                serde_json::to_string(pending)
                    .map_err(|e| CheckpointError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"INSERT INTO checkpoints (thread_id, state, pending_interrupt, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (thread_id) DO UPDATE SET
                   state = excluded.state,
                   pending_interrupt = excluded.pending_interrupt,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&checkpoint.thread_id)
        .bind(&state_text)
        .bind(&pending_text)
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Store(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Store(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(row_to_checkpoint(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Store(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
