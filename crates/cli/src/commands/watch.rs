// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use consult_core::{ClientId, ConsultationId, Message, MessageState};
use tracing::info;

use crate::display::format_message;
use crate::error::Result;
use crate::sync::{ConversationObserver, SyncEvent};

use super::{parse_consultation, Session};

/// Prints messages the first time they appear and again when their state changes.
#[derive(Default)]
struct LinePrinter {
    printed: Mutex<HashMap<ClientId, MessageState>>,
}

impl LinePrinter {
    /// Lines not yet printed for `view`, remembering them as printed.
    fn fresh_lines(&self, view: &[Message]) -> Vec<String> {
        let mut printed = self.printed.lock().unwrap_or_else(|e| e.into_inner());
        view.iter()
            .filter(|msg| printed.insert(msg.client_id, msg.state) != Some(msg.state))
            .map(format_message)
            .collect()
    }
}

impl ConversationObserver for LinePrinter {
    fn on_view(&self, _consultation_id: &ConsultationId, view: &[Message]) {
        for line in self.fresh_lines(view) {
            println!("{}", line);
        }
    }

    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::AuthRequired { reason, .. } => {
                eprintln!("warning: sign-in required ({}); messages stay queued", reason)
            }
            SyncEvent::StoreFailure { error, .. } => {
                eprintln!("warning: could not save message: {}", error)
            }
            _ => {}
        }
    }
}

pub async fn run(state_dir: &Path, consultation: &str) -> Result<()> {
    let consultation_id = parse_consultation(consultation)?;
    let session = Session::open(state_dir)?;

    session.monitor.probe_once().await;
    session.monitor.start();
    let subscription = session
        .engine
        .subscribe(consultation_id.clone(), Arc::new(LinePrinter::default()));
    session.engine.start();
    info!(consultation = %consultation_id, "watching");

    tokio::signal::ctrl_c().await?;

    session.engine.unsubscribe(subscription);
    session.engine.stop().await;
    session.monitor.stop().await;
    Ok(())
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
