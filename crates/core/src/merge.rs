// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconcile gateway history with locally known messages.
//!
//! Merge rules:
//! - A gateway row that echoes its client id is keyed by it.
//! - A row whose remote id is already in the local ledger takes the ledger's
//!   client id.
//! - Otherwise a row is matched to a local message with the same sender and
//!   body whose delivery window, from creation to its latest send attempt,
//!   covers the row's server time give or take the tolerance. Locals no other
//!   row has claimed yet are preferred.
//! - Unmatched rows get an id derived from their remote id.
//! - Rows sharing a client id collapse to the earliest one.
//! - Pending entries whose client id resolved to a row are confirmed.
//!
//! The output lists confirmed messages by `(remote_created_at, remote_id)`,
//! followed by unresolved pending entries by `(created_at, seq)`. The function
//! is pure and deterministic, so merging the same inputs twice yields the
//! same view.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};

use crate::ids::{ClientId, RemoteId};
use crate::message::{Message, MessageState, PendingEntry, RemoteMessage};

/// A pending entry the gateway has now been seen to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub client_id: ClientId,
    pub remote_id: RemoteId,
    pub remote_created_at: DateTime<Utc>,
}

/// Output of [`merge_view`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The ordered, duplicate-free conversation.
    pub view: Vec<Message>,
    /// Pending entries to remove from the store.
    pub confirmed: Vec<Confirmation>,
}

/// Merges one consultation's gateway rows with local state.
///
/// * `remote` - every gateway row known for the consultation
/// * `ledger` - messages this device has already seen confirmed (`Sent`)
/// * `pending` - entries still waiting in the store
/// * `tolerance` - how far a row's server time may drift from a local
///   message's creation time and still match it
pub fn merge_view(
    remote: &[RemoteMessage],
    ledger: &[Message],
    pending: &[PendingEntry],
    tolerance: TimeDelta,
) -> MergeOutcome {
    // Local candidates for heuristic matching; ledger entries shadow pending ones.
    let mut seen = HashSet::new();
    let mut locals: Vec<Candidate<'_>> = ledger
        .iter()
        .map(|msg| Candidate::new(msg, msg.remote_created_at))
        .chain(
            pending
                .iter()
                .map(|entry| Candidate::new(&entry.message, entry.last_attempt_at)),
        )
        .filter(|candidate| seen.insert(candidate.message.client_id))
        .collect();
    locals.sort_by(|a, b| {
        a.message
            .created_at
            .cmp(&b.message.created_at)
            .then_with(|| a.message.client_id.cmp(&b.message.client_id))
    });

    let local_by_id: HashMap<ClientId, &Message> = locals
        .iter()
        .map(|candidate| (candidate.message.client_id, candidate.message))
        .collect();
    let ledger_by_remote: HashMap<&RemoteId, ClientId> = ledger
        .iter()
        .filter_map(|msg| msg.remote_id.as_ref().map(|rid| (rid, msg.client_id)))
        .collect();

    let mut rows: Vec<&RemoteMessage> = remote.iter().collect();
    rows.sort_by(|a, b| {
        a.remote_created_at
            .cmp(&b.remote_created_at)
            .then_with(|| a.remote_id.cmp(&b.remote_id))
    });

    // Resolve each row to a client id; first row per id wins (rows are sorted).
    let mut claimed: HashSet<ClientId> = HashSet::new();
    let mut winners: Vec<(ClientId, &RemoteMessage)> = Vec::new();
    for row in rows {
        let key = if let Some(id) = row.client_id {
            id
        } else if let Some(id) = ledger_by_remote.get(&row.remote_id) {
            *id
        } else if let Some(local) = heuristic_match(row, &locals, &claimed, tolerance) {
            local.client_id
        } else {
            ClientId::for_remote(&row.remote_id)
        };

        if claimed.insert(key) {
            winners.push((key, row));
        }
    }

    let mut confirmed_view: Vec<Message> = winners
        .iter()
        .map(|(key, row)| {
            let created_at = local_by_id
                .get(key)
                .map(|local| local.created_at)
                .unwrap_or(row.remote_created_at);
            Message {
                client_id: *key,
                consultation_id: row.consultation_id.clone(),
                sender_id: row.sender_id.clone(),
                sender_role: row.sender_role,
                body: row.body.clone(),
                created_at,
                remote_id: Some(row.remote_id.clone()),
                remote_created_at: Some(row.remote_created_at),
                state: MessageState::Sent,
            }
        })
        .collect();

    // Confirmed locally but not yet listed by the gateway.
    for msg in ledger {
        if msg.is_confirmed() && !claimed.contains(&msg.client_id) {
            claimed.insert(msg.client_id);
            confirmed_view.push(msg.clone());
        }
    }

    confirmed_view.sort_by(|a, b| {
        a.remote_created_at
            .cmp(&b.remote_created_at)
            .then_with(|| a.remote_id.cmp(&b.remote_id))
    });

    let confirmed_by_id: HashMap<ClientId, &Message> = confirmed_view
        .iter()
        .map(|msg| (msg.client_id, msg))
        .collect();

    let mut confirmed = Vec::new();
    let mut unresolved: Vec<&PendingEntry> = Vec::new();
    for entry in pending {
        match confirmed_by_id.get(&entry.client_id()) {
            Some(msg) => {
                if let (Some(remote_id), Some(remote_created_at)) =
                    (&msg.remote_id, msg.remote_created_at)
                {
                    confirmed.push(Confirmation {
                        client_id: entry.client_id(),
                        remote_id: remote_id.clone(),
                        remote_created_at,
                    });
                }
            }
            None => unresolved.push(entry),
        }
    }

    unresolved.sort_by(|a, b| {
        a.message
            .created_at
            .cmp(&b.message.created_at)
            .then_with(|| a.seq.cmp(&b.seq))
    });

    let mut view = confirmed_view;
    view.extend(unresolved.into_iter().map(|entry| entry.message.clone()));

    MergeOutcome { view, confirmed }
}

/// A local message and the last time it was handed to the gateway.
struct Candidate<'a> {
    message: &'a Message,
    last_sent: DateTime<Utc>,
}

impl<'a> Candidate<'a> {
    fn new(message: &'a Message, sent_at: Option<DateTime<Utc>>) -> Self {
        let last_sent = sent_at.map_or(message.created_at, |t| t.max(message.created_at));
        Candidate { message, last_sent }
    }

    /// A row can only have landed between creation and the latest attempt.
    fn could_have_landed(&self, row: &RemoteMessage, tolerance: TimeDelta) -> bool {
        self.message.created_at - row.remote_created_at <= tolerance
            && row.remote_created_at - self.last_sent <= tolerance
    }
}

/// Finds the local message a row most likely corresponds to.
fn heuristic_match<'a>(
    row: &RemoteMessage,
    locals: &[Candidate<'a>],
    claimed: &HashSet<ClientId>,
    tolerance: TimeDelta,
) -> Option<&'a Message> {
    let mut candidates = locals
        .iter()
        .filter(|candidate| {
            let local = candidate.message;
            local.consultation_id == row.consultation_id
                && local.sender_id == row.sender_id
                && local.body == row.body
                && candidate.could_have_landed(row, tolerance)
        })
        .map(|candidate| candidate.message);

    let first = candidates.next()?;
    if !claimed.contains(&first.client_id) {
        return Some(first);
    }
    // Prefer an unclaimed local; fall back to a claimed one so that a
    // duplicated append collapses onto the message it duplicates.
    candidates
        .find(|local| !claimed.contains(&local.client_id))
        .or(Some(first))
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
