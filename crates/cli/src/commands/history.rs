// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use consult_core::Message;

use crate::cli::OutputFormat;
use crate::display::format_message;
use crate::error::Result;

use super::{parse_consultation, Session};

pub async fn run(state_dir: &Path, consultation: &str, output: OutputFormat) -> Result<()> {
    let consultation_id = parse_consultation(consultation)?;
    let session = Session::open(state_dir)?;

    session.monitor.probe_once().await;
    if !session.monitor.is_online() {
        eprintln!("warning: gateway unreachable, showing queued messages only");
    }
    let view = session.engine.refresh(&consultation_id).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => print!("{}", render_text(&view)),
    }
    Ok(())
}

fn render_text(view: &[Message]) -> String {
    if view.is_empty() {
        return "no messages\n".to_string();
    }
    let mut out = String::new();
    for msg in view {
        out.push_str(&format_message(msg));
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
