// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::sync::test_helpers::{at, compose, consultation, receipt};
use tempfile::tempdir;

#[test]
fn test_enqueue_creates_queued_entry() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "Bird appears lethargic", 5);

    assert!(store.enqueue(&msg).unwrap());

    let entries = store.all().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.client_id(), msg.client_id);
    assert_eq!(entry.state(), MessageState::Queued);
    assert_eq!(entry.retry_count, 0);
    assert!(entry.last_attempt_at.is_none());
    assert_eq!(entry.message.body, "Bird appears lethargic");
    assert_eq!(entry.message.sender_role, SenderRole::Reporter);
    assert_eq!(entry.message.created_at, msg.created_at);
}

#[test]
fn test_enqueue_is_idempotent_on_client_id() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();
    store.mark_failed(&msg.client_id, at(10)).unwrap();

    assert!(!store.enqueue(&msg).unwrap());

    assert_eq!(store.len().unwrap(), 1);
    let entry = store.get(&msg.client_id).unwrap().unwrap();
    assert_eq!(entry.retry_count, 1, "existing entry must be left untouched");
}

#[test]
fn test_list_pending_orders_by_created_at_then_seq() {
    let store = PendingStore::open_in_memory().unwrap();
    let late = compose("C1", "late", 30);
    let early = compose("C1", "early", 10);
    let tie_first = compose("C1", "tie-1", 20);
    let tie_second = compose("C1", "tie-2", 20);
    let other = compose("C2", "elsewhere", 0);
    for msg in [&late, &tie_first, &early, &tie_second, &other] {
        store.enqueue(msg).unwrap();
    }

    let bodies: Vec<String> = store
        .list_pending(&consultation("C1"))
        .unwrap()
        .into_iter()
        .map(|e| e.message.body)
        .collect();

    assert_eq!(bodies, vec!["early", "tie-1", "tie-2", "late"]);
}

#[test]
fn test_mark_sent_removes_entry() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();

    assert!(store.mark_sent(&msg.client_id, &receipt("r-1", 6)).unwrap());
    assert!(store.is_empty().unwrap());
    assert!(!store.mark_sent(&msg.client_id, &receipt("r-1", 6)).unwrap());
}

#[test]
fn test_mark_failed_increments_counter() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();

    assert_eq!(store.mark_failed(&msg.client_id, at(10)).unwrap(), Some(1));
    assert_eq!(store.mark_failed(&msg.client_id, at(20)).unwrap(), Some(2));

    let entry = store.get(&msg.client_id).unwrap().unwrap();
    assert_eq!(entry.state(), MessageState::Failed);
    assert_eq!(entry.retry_count, 2);
    assert_eq!(entry.last_attempt_at, Some(at(20)));
}

#[test]
fn test_mark_failed_after_mark_sent_is_noop() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();
    store.mark_sent(&msg.client_id, &receipt("r-1", 6)).unwrap();

    assert_eq!(store.mark_failed(&msg.client_id, at(10)).unwrap(), None);
    assert!(store.is_empty().unwrap());
}

#[test]
fn test_requeue_only_moves_failed_entries() {
    let store = PendingStore::open_in_memory().unwrap();
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();

    assert!(!store.requeue(&msg.client_id).unwrap());

    store.mark_failed(&msg.client_id, at(10)).unwrap();
    assert!(store.requeue(&msg.client_id).unwrap());

    let entry = store.get(&msg.client_id).unwrap().unwrap();
    assert_eq!(entry.state(), MessageState::Queued);
    assert_eq!(entry.retry_count, 1, "requeue keeps the counter");
}

#[test]
fn test_reset_retries_single_and_all() {
    let store = PendingStore::open_in_memory().unwrap();
    let a = compose("C1", "A", 5);
    let b = compose("C2", "B", 6);
    store.enqueue(&a).unwrap();
    store.enqueue(&b).unwrap();
    store.mark_failed(&a.client_id, at(10)).unwrap();
    store.mark_failed(&b.client_id, at(10)).unwrap();

    assert_eq!(store.reset_retries(Some(&a.client_id)).unwrap(), 1);
    let entry = store.get(&a.client_id).unwrap().unwrap();
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.state(), MessageState::Queued);
    assert!(entry.last_attempt_at.is_none());
    assert_eq!(store.get(&b.client_id).unwrap().unwrap().retry_count, 1);

    assert_eq!(store.reset_retries(None).unwrap(), 2);
    assert_eq!(store.get(&b.client_id).unwrap().unwrap().retry_count, 0);
}

#[test]
fn test_entries_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("pending.db");
    let msg = compose("C1", "Bird appears lethargic", 5);

    {
        let store = PendingStore::open(&path).unwrap();
        store.enqueue(&msg).unwrap();
        store.mark_failed(&msg.client_id, at(9)).unwrap();
    }

    let store = PendingStore::open(&path).unwrap();
    let entries = store.all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].client_id(), msg.client_id);
    assert_eq!(entries[0].retry_count, 1);
    assert_eq!(entries[0].state(), MessageState::Failed);
}

#[test]
fn test_corrupted_row_is_reported() {
    let store = PendingStore::open_in_memory().unwrap();
    store
        .conn()
        .execute(
            "INSERT INTO pending_messages
             (client_id, consultation_id, sender_id, sender_role, body, created_at, state)
             VALUES ('not-a-uuid', 'C1', 's', 'reporter', 'b', '2026-03-01T09:00:00Z', 'queued')",
            [],
        )
        .unwrap();

    assert!(matches!(store.all(), Err(StoreError::Database(_))));
}

#[test]
fn test_concurrent_mark_sent_and_mark_failed() {
    let store = std::sync::Arc::new(PendingStore::open_in_memory().unwrap());
    let msg = compose("C1", "A", 5);
    store.enqueue(&msg).unwrap();

    let sent = {
        let store = std::sync::Arc::clone(&store);
        let id = msg.client_id;
        std::thread::spawn(move || store.mark_sent(&id, &receipt("r-1", 6)).unwrap())
    };
    let failed = {
        let store = std::sync::Arc::clone(&store);
        let id = msg.client_id;
        std::thread::spawn(move || store.mark_failed(&id, at(7)).unwrap())
    };
    sent.join().unwrap();
    failed.join().unwrap();

    // Whatever the interleaving, the confirmation sticks.
    assert!(store.is_empty().unwrap());
}
