// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use consult_core::{Message, MessageState, PendingEntry};

use crate::sync::FlushReport;

/// Maximum body width in one-line listings.
const BODY_WIDTH: usize = 60;

/// Format one conversation line.
///
/// Confirmed messages show server time; local ones show device time plus
/// their delivery state.
pub fn format_message(msg: &Message) -> String {
    let time = msg.remote_created_at.unwrap_or(msg.created_at);
    let marker = match msg.state {
        MessageState::Sent => String::new(),
        other => format!(" [{}]", other.as_str()),
    };
    format!(
        "{} {} ({}){}: {}",
        time.format("%Y-%m-%d %H:%M"),
        msg.sender_id,
        msg.sender_role,
        marker,
        msg.body
    )
}

/// Format a pending entry for `consult pending`.
pub fn format_entry(entry: &PendingEntry) -> String {
    let mut line = format!(
        "{}  {}  {}  retries={}",
        entry.client_id(),
        entry.consultation_id(),
        entry.state().as_str(),
        entry.retry_count
    );
    if let Some(at) = entry.last_attempt_at {
        line.push_str(&format!("  last={}", at.format("%Y-%m-%d %H:%M:%S")));
    }
    line.push_str("  ");
    line.push_str(&truncate(&entry.message.body, BODY_WIDTH));
    line
}

pub fn format_report(report: &FlushReport) -> String {
    format!(
        "sent {}, failed {}, deferred {}",
        report.sent, report.failed, report.deferred
    )
}

/// Shorten to `width` characters on one line.
pub fn truncate(text: &str, width: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
