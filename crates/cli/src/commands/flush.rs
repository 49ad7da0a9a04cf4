// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use tracing::info;

use crate::cli::OutputFormat;
use crate::display::format_report;
use crate::error::{Error, Result};
use crate::sync::FlushReport;

use super::Session;

pub async fn run(state_dir: &Path, force: bool, output: OutputFormat) -> Result<()> {
    let session = Session::open(state_dir)?;

    if force {
        let reset = session.store.reset_retries(None)?;
        info!(reset, "retry counters reset");
        if output == OutputFormat::Text && reset > 0 {
            println!("reset {} retry counter(s)", reset);
        }
    }

    session.monitor.probe_once().await;
    if !session.monitor.is_online() && output == OutputFormat::Text {
        println!("gateway unreachable, nothing attempted");
    }
    let report = session.engine.flush().await;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => println!("{}", format_report(&report)),
    }
    check(&report)
}

/// A cycle stopped by rejected credentials is a command failure.
fn check(report: &FlushReport) -> Result<()> {
    if report.auth_required {
        return Err(Error::Auth(
            "gateway rejected the current credentials".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "flush_tests.rs"]
mod tests;
