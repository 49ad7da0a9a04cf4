// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use chrono::{DateTime, Utc};
use consult_core::{ClientId, ConsultationId, MessageState, PendingEntry};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::display::format_entry;
use crate::error::Result;

use super::{open_store, parse_consultation};

/// JSON representation of a pending entry.
#[derive(Serialize)]
struct PendingEntryJson<'a> {
    client_id: ClientId,
    consultation_id: &'a ConsultationId,
    state: MessageState,
    retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    body: &'a str,
}

impl<'a> From<&'a PendingEntry> for PendingEntryJson<'a> {
    fn from(entry: &'a PendingEntry) -> Self {
        PendingEntryJson {
            client_id: entry.client_id(),
            consultation_id: entry.consultation_id(),
            state: entry.state(),
            retry_count: entry.retry_count,
            last_attempt_at: entry.last_attempt_at,
            created_at: entry.message.created_at,
            body: &entry.message.body,
        }
    }
}

pub fn run(state_dir: &Path, consultation: Option<&str>, output: OutputFormat) -> Result<()> {
    let store = open_store(state_dir)?;
    let entries = match consultation {
        Some(id) => store.list_pending(&parse_consultation(id)?)?,
        None => store.all()?,
    };
    println!("{}", render(&entries, output)?);
    Ok(())
}

fn render(entries: &[PendingEntry], output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => {
            let rows: Vec<PendingEntryJson<'_>> = entries.iter().map(Into::into).collect();
            Ok(serde_json::to_string_pretty(&rows)?)
        }
        OutputFormat::Text if entries.is_empty() => Ok("no pending messages".to_string()),
        OutputFormat::Text => Ok(entries
            .iter()
            .map(format_entry)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
