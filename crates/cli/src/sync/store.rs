// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store for messages the gateway has not confirmed yet.
//!
//! Entries live in a single SQLite table keyed by client id. Every operation
//! runs under one connection mutex, so operations are atomic relative to each
//! other. Removing an entry is final: a later `mark_failed` for the same id
//! finds nothing and does nothing.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use consult_core::{
    ClientId, ConsultationId, Message, MessageState, PendingEntry, Receipt, SenderRole,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// SQL schema for the pending message store.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT NOT NULL UNIQUE,
    consultation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_role TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'queued',
    last_attempt_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_consultation ON pending_messages(consultation_id);
"#;

const SELECT_COLUMNS: &str = "seq, client_id, consultation_id, sender_id, sender_role, body,
     created_at, retry_count, state, last_attempt_at";

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted entry: {0}")]
    Corrupted(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Parse a text column, returning a rusqlite error on failure.
fn parse_column<T: std::str::FromStr>(value: &str, column: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(StoreError::Corrupted(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

fn parse_timestamp(value: &str, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(StoreError::Corrupted(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<PendingEntry> {
    let client_id: String = row.get(1)?;
    let consultation_id: String = row.get(2)?;
    let role: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let retry_count: i64 = row.get(7)?;
    let state: String = row.get(8)?;
    let last_attempt_at: Option<String> = row.get(9)?;

    let message = Message {
        client_id: parse_column::<ClientId>(&client_id, "client_id")?,
        consultation_id: parse_column::<ConsultationId>(&consultation_id, "consultation_id")?,
        sender_id: row.get(3)?,
        sender_role: parse_column::<SenderRole>(&role, "sender_role")?,
        body: row.get(5)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        remote_id: None,
        remote_created_at: None,
        state: parse_column::<MessageState>(&state, "state")?,
    };

    Ok(PendingEntry {
        message,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        last_attempt_at: last_attempt_at
            .as_deref()
            .map(|value| parse_timestamp(value, "last_attempt_at"))
            .transpose()?,
        seq: row.get(0)?,
    })
}

fn sort_entries(entries: &mut [PendingEntry]) {
    entries.sort_by(|a, b| {
        a.message
            .created_at
            .cmp(&b.message.created_at)
            .then_with(|| a.seq.cmp(&b.seq))
    });
}

/// SQLite-backed pending message store.
pub struct PendingStore {
    conn: Mutex<Connection>,
}

impl PendingStore {
    /// Open the store at the given path, creating it if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(PendingStore {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(PendingStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a `Queued` entry with a zero retry counter.
    ///
    /// Returns false when an entry with the same client id already exists;
    /// the existing entry is left untouched.
    pub fn enqueue(&self, message: &Message) -> StoreResult<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO pending_messages
             (client_id, consultation_id, sender_id, sender_role, body, created_at,
              retry_count, state, last_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, NULL)",
            params![
                message.client_id.to_string(),
                message.consultation_id.as_str(),
                message.sender_id,
                message.sender_role.as_str(),
                message.body,
                message.created_at.to_rfc3339(),
                MessageState::Queued.as_str(),
            ],
        )?;
        if inserted == 0 {
            tracing::debug!(client_id = %message.client_id, "enqueue ignored, entry exists");
        }
        Ok(inserted > 0)
    }

    /// Entries for one consultation, by creation time then enqueue order.
    pub fn list_pending(&self, consultation_id: &ConsultationId) -> StoreResult<Vec<PendingEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_messages WHERE consultation_id = ?1 ORDER BY seq"
        ))?;
        let mut entries = stmt
            .query_map(params![consultation_id.as_str()], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Snapshot of every entry across consultations.
    pub fn all(&self) -> StoreResult<Vec<PendingEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_messages ORDER BY seq"
        ))?;
        let mut entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub fn get(&self, client_id: &ClientId) -> StoreResult<Option<PendingEntry>> {
        let entry = self
            .conn()
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM pending_messages WHERE client_id = ?1"),
                params![client_id.to_string()],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Removes a confirmed entry. Returns false if it was already gone.
    pub fn mark_sent(&self, client_id: &ClientId, receipt: &Receipt) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM pending_messages WHERE client_id = ?1",
            params![client_id.to_string()],
        )?;
        if removed > 0 {
            tracing::debug!(
                client_id = %client_id,
                remote_id = %receipt.remote_id,
                "pending entry confirmed"
            );
        }
        Ok(removed > 0)
    }

    /// Records a failed attempt and returns the new retry count.
    ///
    /// Returns `None` when the entry no longer exists.
    pub fn mark_failed(
        &self,
        client_id: &ClientId,
        attempted_at: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "UPDATE pending_messages
                 SET retry_count = retry_count + 1, state = ?2, last_attempt_at = ?3
                 WHERE client_id = ?1
                 RETURNING retry_count",
                params![
                    client_id.to_string(),
                    MessageState::Failed.as_str(),
                    attempted_at.to_rfc3339(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|c| u32::try_from(c).unwrap_or(u32::MAX)))
    }

    /// Moves a `Failed` entry back to `Queued`, keeping its counter.
    pub fn requeue(&self, client_id: &ClientId) -> StoreResult<bool> {
        let updated = self.conn().execute(
            "UPDATE pending_messages SET state = ?2 WHERE client_id = ?1 AND state = ?3",
            params![
                client_id.to_string(),
                MessageState::Queued.as_str(),
                MessageState::Failed.as_str(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Clears retry counters and backoff, for one entry or all of them.
    ///
    /// Returns the number of entries reset.
    pub fn reset_retries(&self, client_id: Option<&ClientId>) -> StoreResult<usize> {
        let conn = self.conn();
        let reset = match client_id {
            Some(id) => conn.execute(
                "UPDATE pending_messages SET retry_count = 0, state = ?2, last_attempt_at = NULL
                 WHERE client_id = ?1",
                params![id.to_string(), MessageState::Queued.as_str()],
            )?,
            None => conn.execute(
                "UPDATE pending_messages SET retry_count = 0, state = ?1, last_attempt_at = NULL",
                params![MessageState::Queued.as_str()],
            )?,
        };
        Ok(reset)
    }

    pub fn len(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pending_messages", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
