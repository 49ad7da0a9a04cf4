// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use chrono::{TimeZone, Utc};
use consult_core::{ConsultationId, MessageState, SenderRole};

#[test]
fn test_render_empty_history() {
    assert_eq!(render_text(&[]), "no messages\n");
}

#[test]
fn test_render_one_line_per_message() {
    let view: Vec<Message> = ["first", "second"]
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let mut msg = Message::compose(
                ConsultationId::new("C1").unwrap(),
                "farm-17",
                SenderRole::Reporter,
                *body,
                Utc.with_ymd_and_hms(2026, 3, 1, 9, i as u32, 0).unwrap(),
            )
            .unwrap();
            msg.transition(MessageState::Queued).unwrap();
            msg
        })
        .collect();

    let text = render_text(&view);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("[queued]: first"), "{}", lines[0]);
    assert!(lines[1].starts_with("2026-03-01 09:01"), "{}", lines[1]);
}
