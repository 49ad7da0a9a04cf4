// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use consult_core::{Message, MessageState};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::error::Result;

use super::{parse_consultation, Session};

pub async fn run(state_dir: &Path, consultation: &str, text: &str, output: OutputFormat) -> Result<()> {
    let consultation_id = parse_consultation(consultation)?;
    let session = Session::open(state_dir)?;
    let sender_id = session.sender_id()?.to_string();
    let role = session.config.identity.sender_role;

    let state = session.monitor.probe_once().await;
    debug!(%state, "connectivity before send");
    let backlog = session.store.list_pending(&consultation_id)?.len();

    let mut msg = session
        .engine
        .submit(text, &consultation_id, &sender_id, role)
        .await?;

    if backlog > 0 && msg.state == MessageState::Queued && session.monitor.is_online() {
        // Queued behind older messages; deliver them all in order now.
        let report = session.engine.flush().await;
        debug!(?report, "flushed backlog");
        if let Some(receipt) = session.engine.receipt(&consultation_id, &msg.client_id) {
            msg.mark_sent(receipt)?;
        }
    }

    println!("{}", render(&msg, output)?);
    Ok(())
}

fn render(msg: &Message, output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(msg)?),
        OutputFormat::Text => Ok(match (&msg.state, &msg.remote_id) {
            (MessageState::Sent, Some(remote_id)) => format!("sent {}", remote_id),
            _ => format!("queued {}", msg.client_id),
        }),
    }
}

#[cfg(test)]
#[path = "send_tests.rs"]
mod tests;
