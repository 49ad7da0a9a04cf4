// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry scheduler for queued messages.
//!
//! Entry lifecycle:
//!
//! ```text
//! Queued ──attempt──► Sent (removed)
//!   ▲        │
//!   │        └─error──► Failed(n) ──backoff elapsed──┐
//!   └────────────────────────────────────────────────┘
//! ```
//!
//! A cycle runs on a timer, on every Offline → Online transition, and on
//! demand. Consultations are flushed concurrently; within one consultation
//! entries go strictly in enqueue order and the first entry that fails, is
//! backing off, or is parked blocks the ones behind it for that cycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use consult_core::{Clock, ConsultationId, MessageState, PendingEntry};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connectivity::{ConnectivityMonitor, ConnectivityState, ListenerId};
use super::engine::{bounded, SyncConfig, SyncEvent, SyncState};
use super::gateway::{Gateway, GatewayError};
use super::store::PendingStore;

/// Backoff and parking rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after the first failure.
    pub initial: Duration,
    /// Upper bound for any wait.
    pub max: Duration,
    /// Failed attempts before an entry is parked (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            max_attempts: 0,
        }
    }
}

impl RetryPolicy {
    /// Wait required after `retry_count` failures: doubling, capped.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry_count - 1);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Parked entries wait for an operator reset.
    pub fn is_parked(&self, retry_count: u32) -> bool {
        self.max_attempts > 0 && retry_count >= self.max_attempts
    }

    /// Earliest time the entry may be attempted again.
    pub fn next_attempt_at(&self, entry: &PendingEntry) -> Option<DateTime<Utc>> {
        let last = entry.last_attempt_at?;
        let wait = TimeDelta::from_std(self.backoff(entry.retry_count)).unwrap_or(TimeDelta::MAX);
        Some(last.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    pub fn is_due(&self, entry: &PendingEntry, now: DateTime<Utc>) -> bool {
        match self.next_attempt_at(entry) {
            Some(due) => now >= due,
            None => true,
        }
    }
}

/// Counts from one retry cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
    /// Entries not attempted: offline, backing off, parked or blocked.
    pub deferred: usize,
    pub auth_required: bool,
}

impl FlushReport {
    fn absorb(&mut self, other: FlushReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.deferred += other.deferred;
        self.auth_required |= other.auth_required;
    }
}

struct SchedulerInner {
    store: Arc<PendingStore>,
    gateway: Arc<dyn Gateway>,
    monitor: Arc<ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    state: Arc<SyncState>,
    policy: RetryPolicy,
    interval: Duration,
    request_timeout: Duration,
    /// One cycle at a time.
    cycle: tokio::sync::Mutex<()>,
}

impl SchedulerInner {
    fn backlog(&self) -> usize {
        let stored = self.store.len().unwrap_or(0);
        stored + self.state.unsaved().len()
    }

    async fn run_cycle(&self) -> FlushReport {
        let _cycle = self.cycle.lock().await;
        let mut report = FlushReport::default();

        if !self.monitor.is_online() {
            report.deferred = self.backlog();
            debug!(deferred = report.deferred, "offline, skipping retry cycle");
            return report;
        }
        if self.state.is_auth_suspended() {
            report.auth_required = true;
            report.deferred = self.backlog();
            debug!(deferred = report.deferred, "awaiting re-authentication, skipping retry cycle");
            return report;
        }

        self.state.persist_unsaved(&self.store);
        let mut entries = match self.store.all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to read pending entries");
                Vec::new()
            }
        };
        let mut next_seq = entries.iter().map(|e| e.seq).max().unwrap_or(0);
        for message in self.state.unsaved() {
            next_seq = next_seq.saturating_add(1);
            entries.push(PendingEntry {
                message,
                retry_count: 0,
                last_attempt_at: None,
                seq: next_seq,
            });
        }

        let mut groups: BTreeMap<ConsultationId, Vec<PendingEntry>> = BTreeMap::new();
        for entry in entries {
            groups
                .entry(entry.consultation_id().clone())
                .or_default()
                .push(entry);
        }

        let now = self.clock.now();
        let results = join_all(
            groups
                .into_values()
                .map(|entries| self.flush_consultation(entries, now)),
        )
        .await;
        for result in results {
            report.absorb(result);
        }

        if report.sent > 0 || report.failed > 0 {
            info!(
                sent = report.sent,
                failed = report.failed,
                deferred = report.deferred,
                "retry cycle finished"
            );
        }
        report
    }

    async fn flush_consultation(&self, entries: Vec<PendingEntry>, now: DateTime<Utc>) -> FlushReport {
        let mut report = FlushReport::default();
        let total = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            let remaining = total - index;
            let client_id = entry.client_id();
            let consultation_id = entry.consultation_id().clone();

            if let Some(receipt) = self.state.confirmed_receipt(&consultation_id, &client_id) {
                // Confirmed by a refresh after the snapshot was taken.
                if let Err(e) = self.store.mark_sent(&client_id, &receipt) {
                    warn!(client_id = %client_id, error = %e, "failed to clear confirmed entry");
                }
                self.state.release_unsaved(&client_id);
                continue;
            }
            if self.policy.is_parked(entry.retry_count) {
                debug!(client_id = %client_id, retries = entry.retry_count, "entry parked");
                report.deferred += remaining;
                break;
            }
            if !self.policy.is_due(&entry, now) {
                debug!(client_id = %client_id, retries = entry.retry_count, "entry backing off");
                report.deferred += remaining;
                break;
            }
            if entry.state() == MessageState::Failed {
                if let Err(e) = self.store.requeue(&client_id) {
                    warn!(client_id = %client_id, error = %e, "failed to requeue entry");
                    report.deferred += remaining;
                    break;
                }
            }

            let mut msg = entry.message;
            if let Err(e) = msg.transition(MessageState::Sending) {
                warn!(client_id = %client_id, error = %e, "entry not sendable");
                report.deferred += remaining;
                break;
            }

            match bounded(self.request_timeout, self.gateway.append(&msg)).await {
                Ok(receipt) => {
                    if let Err(e) = self.store.mark_sent(&client_id, &receipt) {
                        warn!(client_id = %client_id, error = %e, "failed to clear delivered entry");
                    }
                    self.state.release_unsaved(&client_id);
                    let remote_id = receipt.remote_id.clone();
                    match msg.mark_sent(receipt) {
                        Ok(()) => self.state.record_confirmed(&msg),
                        Err(e) => warn!(client_id = %client_id, error = %e, "invalid receipt"),
                    }
                    debug!(client_id = %client_id, remote_id = %remote_id, "queued message delivered");
                    self.state.emit(SyncEvent::Delivered {
                        consultation_id,
                        client_id,
                        remote_id,
                    });
                    report.sent += 1;
                }
                Err(GatewayError::Auth(reason)) => {
                    if self.state.suspend_auth() {
                        warn!(reason = %reason, "gateway rejected credentials, pausing deliveries");
                    }
                    self.state.emit(SyncEvent::AuthRequired {
                        consultation_id,
                        reason,
                    });
                    report.auth_required = true;
                    report.deferred += remaining;
                    break;
                }
                Err(e) => {
                    let retries = if self.state.is_unsaved(&client_id) {
                        None
                    } else {
                        match self.store.mark_failed(&client_id, self.clock.now()) {
                            Ok(retries) => retries,
                            Err(store_err) => {
                                warn!(client_id = %client_id, error = %store_err, "failed to record attempt");
                                None
                            }
                        }
                    };
                    warn!(client_id = %client_id, retries = ?retries, error = %e, "delivery failed");
                    report.failed += 1;
                    report.deferred += remaining - 1;
                    break;
                }
            }
        }

        report
    }

    async fn run_loop(&self, trigger: Arc<Notify>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
                _ = trigger.notified() => {}
            }
            let report = self.run_cycle().await;
            debug!(?report, "retry cycle");
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    listener: ListenerId,
}

/// Flushes the pending store with backoff.
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
    running: Mutex<Option<Running>>,
}

impl RetryScheduler {
    pub(crate) fn new(
        store: Arc<PendingStore>,
        gateway: Arc<dyn Gateway>,
        monitor: Arc<ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        state: Arc<SyncState>,
        config: &SyncConfig,
    ) -> Self {
        RetryScheduler {
            inner: Arc::new(SchedulerInner {
                store,
                gateway,
                monitor,
                clock,
                state,
                policy: config.retry.clone(),
                interval: config.retry_interval,
                request_timeout: config.request_timeout,
                cycle: tokio::sync::Mutex::new(()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Runs one cycle and reports what happened.
    ///
    /// Skipped while offline or while deliveries are paused for
    /// re-authentication; the report then counts the backlog as deferred.
    pub async fn run_cycle(&self) -> FlushReport {
        self.inner.run_cycle().await
    }

    /// Starts the timer loop and listens for reconnects.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return;
        }

        let trigger = self.inner.state.flush_trigger();
        let listener = {
            let trigger = Arc::clone(&trigger);
            self.inner.monitor.subscribe(move |state| {
                if state == ConnectivityState::Online {
                    trigger.notify_one();
                }
            })
        };

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run_loop(trigger, token).await });

        *running = Some(Running {
            cancel,
            handle,
            listener,
        });
    }

    /// Stops the loop after any cycle in progress finishes.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            self.inner.monitor.unsubscribe(running.listener);
            running.cancel.cancel();
            let _ = running.handle.await;
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
