// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation sync engine.
//!
//! The engine accepts outbound messages, decides between a direct send and
//! the durable queue, polls the gateway and merges what it returns with the
//! local state. It is explicitly constructed and owned by the caller:
//!
//! ```text
//! submit ──► online? ──yes──► append ──ok──► Sent (ledger)
//!               │               │
//!               no            error
//!               ▼               ▼
//!            Queued ◄───────────┘ ──► PendingStore ──► RetryScheduler
//! ```
//!
//! "Online" here also requires an empty backlog for the consultation: a new
//! message never overtakes older queued ones.
//!
//! Per consultation the engine keeps every gateway row seen so far, the
//! newest server timestamp (the next `list_since` cursor) and a ledger of
//! messages this device saw confirmed. Refreshes of one consultation are
//! single-flight: a refresh that starts while another is running waits for
//! it and returns its result, view or error, without a second request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use consult_core::{
    merge_view, ClientId, Clock, ConsultationId, Message, MessageState, PendingEntry, Receipt,
    RemoteId, RemoteMessage, SenderRole,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connectivity::ConnectivityMonitor;
use super::gateway::{Gateway, GatewayError, GatewayResult};
use super::scheduler::{FlushReport, RetryPolicy, RetryScheduler};
use super::store::PendingStore;
use crate::config::Config;
use crate::error::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs a gateway call with an upper bound on its duration.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl std::future::Future<Output = GatewayResult<T>>,
) -> GatewayResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::Network(format!("timed out after {limit:?}"))))
}

/// Timing and dedup settings for the engine and its scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub request_timeout: Duration,
    pub dedup_tolerance: TimeDelta,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            poll_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            dedup_tolerance: TimeDelta::seconds(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_config(config: &Config) -> Self {
        let sync = &config.sync;
        SyncConfig {
            poll_interval: Duration::from_secs(sync.poll_interval_secs),
            retry_interval: Duration::from_secs(sync.retry_interval_secs),
            request_timeout: config.gateway.request_timeout(),
            dedup_tolerance: i64::try_from(sync.dedup_tolerance_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            retry: RetryPolicy {
                initial: Duration::from_secs(sync.backoff_initial_secs),
                max: Duration::from_secs(sync.backoff_max_secs),
                max_attempts: sync.max_attempts,
            },
        }
    }
}

/// Outcome notifications for callers; presentation is up to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The gateway confirmed a message.
    Delivered {
        consultation_id: ConsultationId,
        client_id: ClientId,
        remote_id: RemoteId,
    },
    /// A message was accepted for later delivery.
    Queued {
        consultation_id: ConsultationId,
        client_id: ClientId,
        reason: String,
    },
    /// The gateway rejected our credentials; deliveries are paused.
    AuthRequired {
        consultation_id: ConsultationId,
        reason: String,
    },
    /// A message could not be persisted; it is kept in memory for now.
    StoreFailure {
        consultation_id: ConsultationId,
        client_id: ClientId,
        error: String,
    },
    /// A refresh could not reach the gateway; the last view still stands.
    RefreshFailed {
        consultation_id: ConsultationId,
        error: String,
    },
}

impl SyncEvent {
    pub fn consultation_id(&self) -> &ConsultationId {
        match self {
            SyncEvent::Delivered {
                consultation_id, ..
            }
            | SyncEvent::Queued {
                consultation_id, ..
            }
            | SyncEvent::AuthRequired {
                consultation_id, ..
            }
            | SyncEvent::StoreFailure {
                consultation_id, ..
            }
            | SyncEvent::RefreshFailed {
                consultation_id, ..
            } => consultation_id,
        }
    }
}

/// Receives conversation views and outcome events.
pub trait ConversationObserver: Send + Sync {
    /// Called with the full ordered view after every refresh or local change.
    fn on_view(&self, consultation_id: &ConsultationId, view: &[Message]);

    fn on_event(&self, _event: &SyncEvent) {}
}

/// Handle returned by [`SyncEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    consultation_id: ConsultationId,
    observer: Arc<dyn ConversationObserver>,
}

/// What the engine knows about one consultation.
#[derive(Default)]
struct Conversation {
    remote: HashMap<RemoteId, RemoteMessage>,
    watermark: Option<DateTime<Utc>>,
    /// Messages this device saw confirmed, by client id.
    ledger: HashMap<ClientId, Message>,
}

/// State shared between the engine and its scheduler.
pub(crate) struct SyncState {
    conversations: Mutex<HashMap<ConsultationId, Conversation>>,
    /// Messages that failed to persist; retried at the start of each cycle.
    unsaved: Mutex<Vec<Message>>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_subscription: AtomicU64,
    auth_suspended: AtomicBool,
    flush_trigger: Arc<Notify>,
}

impl SyncState {
    pub(crate) fn new() -> Self {
        SyncState {
            conversations: Mutex::new(HashMap::new()),
            unsaved: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            auth_suspended: AtomicBool::new(false),
            flush_trigger: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn flush_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.flush_trigger)
    }

    /// Wakes the scheduler loop, if one is running.
    pub(crate) fn request_flush(&self) {
        self.flush_trigger.notify_one();
    }

    pub(crate) fn is_auth_suspended(&self) -> bool {
        self.auth_suspended.load(Ordering::Acquire)
    }

    /// Returns true if this call suspended deliveries.
    pub(crate) fn suspend_auth(&self) -> bool {
        !self.auth_suspended.swap(true, Ordering::AcqRel)
    }

    /// Returns true if deliveries were suspended before this call.
    pub(crate) fn resume_auth(&self) -> bool {
        self.auth_suspended.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn record_confirmed(&self, message: &Message) {
        if !message.is_confirmed() {
            return;
        }
        lock(&self.conversations)
            .entry(message.consultation_id.clone())
            .or_default()
            .ledger
            .insert(message.client_id, message.clone());
    }

    /// Receipt for a message already confirmed on this device.
    pub(crate) fn confirmed_receipt(
        &self,
        consultation_id: &ConsultationId,
        client_id: &ClientId,
    ) -> Option<Receipt> {
        let conversations = lock(&self.conversations);
        let msg = conversations.get(consultation_id)?.ledger.get(client_id)?;
        Some(Receipt {
            remote_id: msg.remote_id.clone()?,
            remote_created_at: msg.remote_created_at?,
        })
    }

    fn absorb(&self, consultation_id: &ConsultationId, rows: Vec<RemoteMessage>) {
        let mut conversations = lock(&self.conversations);
        let conversation = conversations.entry(consultation_id.clone()).or_default();
        for row in rows {
            conversation.watermark = conversation.watermark.max(Some(row.remote_created_at));
            conversation.remote.insert(row.remote_id.clone(), row);
        }
    }

    fn watermark(&self, consultation_id: &ConsultationId) -> Option<DateTime<Utc>> {
        lock(&self.conversations)
            .get(consultation_id)
            .and_then(|c| c.watermark)
    }

    fn snapshot(&self, consultation_id: &ConsultationId) -> (Vec<RemoteMessage>, Vec<Message>) {
        let conversations = lock(&self.conversations);
        match conversations.get(consultation_id) {
            Some(c) => (
                c.remote.values().cloned().collect(),
                c.ledger.values().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    pub(crate) fn hold_unsaved(&self, message: Message) {
        let mut unsaved = lock(&self.unsaved);
        if !unsaved.iter().any(|m| m.client_id == message.client_id) {
            unsaved.push(message);
        }
    }

    pub(crate) fn release_unsaved(&self, client_id: &ClientId) -> bool {
        let mut unsaved = lock(&self.unsaved);
        let before = unsaved.len();
        unsaved.retain(|m| m.client_id != *client_id);
        unsaved.len() != before
    }

    pub(crate) fn is_unsaved(&self, client_id: &ClientId) -> bool {
        lock(&self.unsaved).iter().any(|m| m.client_id == *client_id)
    }

    pub(crate) fn unsaved(&self) -> Vec<Message> {
        lock(&self.unsaved).clone()
    }

    /// Retries persisting held messages. Returns how many are still unsaved.
    pub(crate) fn persist_unsaved(&self, store: &PendingStore) -> usize {
        let mut unsaved = lock(&self.unsaved);
        unsaved.retain(|msg| match store.enqueue(msg) {
            Ok(_) => {
                info!(client_id = %msg.client_id, "persisted previously unsaved message");
                false
            }
            Err(e) => {
                warn!(client_id = %msg.client_id, error = %e, "message still unsaved");
                true
            }
        });
        unsaved.len()
    }

    /// Unsaved messages of one consultation, as pending entries after `after_seq`.
    fn unsaved_entries(&self, consultation_id: &ConsultationId, after_seq: i64) -> Vec<PendingEntry> {
        lock(&self.unsaved)
            .iter()
            .filter(|m| m.consultation_id == *consultation_id)
            .zip(1..)
            .map(|(m, offset)| PendingEntry {
                message: m.clone(),
                retry_count: 0,
                last_attempt_at: None,
                seq: after_seq.saturating_add(offset),
            })
            .collect()
    }

    fn subscribe(
        &self,
        consultation_id: ConsultationId,
        observer: Arc<dyn ConversationObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).push(Subscription {
            id,
            consultation_id,
            observer,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subscriptions).retain(|s| s.id != id);
    }

    fn observers_for(&self, consultation_id: &ConsultationId) -> Vec<Arc<dyn ConversationObserver>> {
        lock(&self.subscriptions)
            .iter()
            .filter(|s| s.consultation_id == *consultation_id)
            .map(|s| Arc::clone(&s.observer))
            .collect()
    }

    /// Consultations with at least one observer, in subscription order.
    fn watched(&self) -> Vec<ConsultationId> {
        let mut watched: Vec<ConsultationId> = Vec::new();
        for s in lock(&self.subscriptions).iter() {
            if !watched.contains(&s.consultation_id) {
                watched.push(s.consultation_id.clone());
            }
        }
        watched
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        for observer in self.observers_for(event.consultation_id()) {
            observer.on_event(&event);
        }
    }

    fn publish(&self, consultation_id: &ConsultationId, view: &[Message]) {
        for observer in self.observers_for(consultation_id) {
            observer.on_view(consultation_id, view);
        }
    }
}

/// Per-consultation single-flight state.
#[derive(Default)]
struct RefreshSlot {
    running: tokio::sync::Mutex<()>,
    /// Bumped after every refresh that reached a result.
    generation: AtomicU64,
    last_view: Mutex<Vec<Message>>,
    last_error: Mutex<Option<GatewayError>>,
}

struct EngineInner {
    store: Arc<PendingStore>,
    gateway: Arc<dyn Gateway>,
    monitor: Arc<ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    state: Arc<SyncState>,
    slots: Mutex<HashMap<ConsultationId, Arc<RefreshSlot>>>,
}

impl EngineInner {
    async fn submit(
        &self,
        text: &str,
        consultation_id: &ConsultationId,
        sender_id: &str,
        sender_role: SenderRole,
    ) -> Result<Message> {
        let mut msg = Message::compose(
            consultation_id.clone(),
            sender_id,
            sender_role,
            text,
            self.clock.now(),
        )?;

        let reason = if !self.monitor.is_online() {
            "offline".to_string()
        } else if self.has_backlog(consultation_id) {
            "older messages still queued".to_string()
        } else {
            msg.transition(MessageState::Sending)?;
            match bounded(self.config.request_timeout, self.gateway.append(&msg)).await {
                Ok(receipt) => {
                    let remote_id = receipt.remote_id.clone();
                    msg.mark_sent(receipt)?;
                    self.state.record_confirmed(&msg);
                    if self.state.resume_auth() {
                        info!("gateway accepted credentials again, resuming deliveries");
                        self.state.request_flush();
                    }
                    debug!(client_id = %msg.client_id, remote_id = %remote_id, "sent directly");
                    self.state.emit(SyncEvent::Delivered {
                        consultation_id: consultation_id.clone(),
                        client_id: msg.client_id,
                        remote_id,
                    });
                    self.publish_local(consultation_id);
                    return Ok(msg);
                }
                Err(GatewayError::Auth(reason)) => {
                    msg.transition(MessageState::Queued)?;
                    self.persist(&msg)?;
                    if self.state.suspend_auth() {
                        warn!(reason = %reason, "gateway rejected credentials, pausing deliveries");
                    }
                    self.state.emit(SyncEvent::AuthRequired {
                        consultation_id: consultation_id.clone(),
                        reason: reason.clone(),
                    });
                    self.publish_local(consultation_id);
                    return Err(Error::Auth(reason));
                }
                Err(e) => {
                    warn!(client_id = %msg.client_id, error = %e, "direct send failed, queueing");
                    e.to_string()
                }
            }
        };

        msg.transition(MessageState::Queued)?;
        self.persist(&msg)?;
        info!(client_id = %msg.client_id, consultation = %consultation_id, %reason, "message queued");
        self.state.emit(SyncEvent::Queued {
            consultation_id: consultation_id.clone(),
            client_id: msg.client_id,
            reason,
        });
        self.state.request_flush();
        self.publish_local(consultation_id);
        Ok(msg)
    }

    /// Whether older messages of the consultation still wait for delivery.
    ///
    /// A new message queues behind them so the consultation keeps its order.
    fn has_backlog(&self, consultation_id: &ConsultationId) -> bool {
        if self
            .state
            .unsaved()
            .iter()
            .any(|m| m.consultation_id == *consultation_id)
        {
            return true;
        }
        match self.store.list_pending(consultation_id) {
            Ok(entries) => !entries.is_empty(),
            Err(e) => {
                warn!(consultation = %consultation_id, error = %e, "failed to read backlog");
                true
            }
        }
    }

    /// Writes a queued message to the store, holding it in memory on failure.
    fn persist(&self, msg: &Message) -> Result<()> {
        match self.store.enqueue(msg) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(client_id = %msg.client_id, error = %e, "failed to persist message");
                self.state.hold_unsaved(msg.clone());
                self.state.emit(SyncEvent::StoreFailure {
                    consultation_id: msg.consultation_id.clone(),
                    client_id: msg.client_id,
                    error: e.to_string(),
                });
                Err(Error::Store(e))
            }
        }
    }

    fn slot(&self, consultation_id: &ConsultationId) -> Arc<RefreshSlot> {
        Arc::clone(
            lock(&self.slots)
                .entry(consultation_id.clone())
                .or_default(),
        )
    }

    async fn refresh(&self, consultation_id: &ConsultationId) -> Result<Vec<Message>> {
        let slot = self.slot(consultation_id);
        let observed = slot.generation.load(Ordering::Acquire);
        let _running = slot.running.lock().await;
        if slot.generation.load(Ordering::Acquire) != observed {
            debug!(consultation = %consultation_id, "joined in-flight refresh");
            if let Some(error) = lock(&slot.last_error).clone() {
                return Err(error.into());
            }
            return Ok(lock(&slot.last_view).clone());
        }

        if self.monitor.is_online() {
            let cursor = self.state.watermark(consultation_id);
            let fetched = bounded(
                self.config.request_timeout,
                self.gateway.list_since(consultation_id, cursor),
            )
            .await;
            match fetched {
                Ok(rows) => {
                    debug!(consultation = %consultation_id, rows = rows.len(), "fetched history");
                    self.state.absorb(consultation_id, rows);
                }
                Err(e) => {
                    self.report_refresh_error(consultation_id, &e);
                    *lock(&slot.last_error) = Some(e.clone());
                    slot.generation.fetch_add(1, Ordering::AcqRel);
                    return Err(e.into());
                }
            }
        }

        let view = self.compose_view(consultation_id)?;
        *lock(&slot.last_view) = view.clone();
        *lock(&slot.last_error) = None;
        slot.generation.fetch_add(1, Ordering::AcqRel);
        self.state.publish(consultation_id, &view);
        Ok(view)
    }

    fn report_refresh_error(&self, consultation_id: &ConsultationId, error: &GatewayError) {
        match error {
            GatewayError::Auth(reason) => {
                if self.state.suspend_auth() {
                    warn!(reason = %reason, "gateway rejected credentials, pausing deliveries");
                }
                self.state.emit(SyncEvent::AuthRequired {
                    consultation_id: consultation_id.clone(),
                    reason: reason.clone(),
                });
            }
            other => {
                debug!(consultation = %consultation_id, error = %other, "refresh failed");
                self.state.emit(SyncEvent::RefreshFailed {
                    consultation_id: consultation_id.clone(),
                    error: other.to_string(),
                });
            }
        }
    }

    /// Merges cached rows, the ledger and pending entries into a view.
    ///
    /// Pending entries the merge finds on the gateway are confirmed here.
    fn compose_view(&self, consultation_id: &ConsultationId) -> Result<Vec<Message>> {
        let mut pending = self.store.list_pending(consultation_id)?;
        let last_seq = pending.iter().map(|e| e.seq).max().unwrap_or(0);
        pending.extend(self.state.unsaved_entries(consultation_id, last_seq));

        let (remote, ledger) = self.state.snapshot(consultation_id);
        let outcome = merge_view(&remote, &ledger, &pending, self.config.dedup_tolerance);

        for confirmation in &outcome.confirmed {
            if let Some(msg) = outcome
                .view
                .iter()
                .find(|m| m.client_id == confirmation.client_id)
            {
                self.state.record_confirmed(msg);
            }
            let receipt = Receipt {
                remote_id: confirmation.remote_id.clone(),
                remote_created_at: confirmation.remote_created_at,
            };
            let released = self.state.release_unsaved(&confirmation.client_id);
            match self.store.mark_sent(&confirmation.client_id, &receipt) {
                Ok(removed) if removed || released => {
                    info!(
                        client_id = %confirmation.client_id,
                        remote_id = %confirmation.remote_id,
                        "pending message found on gateway"
                    );
                    self.state.emit(SyncEvent::Delivered {
                        consultation_id: consultation_id.clone(),
                        client_id: confirmation.client_id,
                        remote_id: confirmation.remote_id.clone(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(client_id = %confirmation.client_id, error = %e, "failed to clear confirmed entry");
                }
            }
        }

        Ok(outcome.view)
    }

    /// Pushes a view built from local state only.
    fn publish_local(&self, consultation_id: &ConsultationId) {
        if self.state.observers_for(consultation_id).is_empty() {
            return;
        }
        match self.compose_view(consultation_id) {
            Ok(view) => self.state.publish(consultation_id, &view),
            Err(e) => debug!(consultation = %consultation_id, error = %e, "local view unavailable"),
        }
    }

    async fn poll_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            for consultation_id in self.state.watched() {
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = self.refresh(&consultation_id) => result,
                };
                if let Err(e) = result {
                    debug!(consultation = %consultation_id, error = %e, "poll failed");
                }
            }
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Offline-tolerant message sync for one device.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    scheduler: RetryScheduler,
    poller: Mutex<Option<Running>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<PendingStore>,
        gateway: Arc<dyn Gateway>,
        monitor: Arc<ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let state = Arc::new(SyncState::new());
        let scheduler = RetryScheduler::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            Arc::clone(&clock),
            Arc::clone(&state),
            &config,
        );
        SyncEngine {
            inner: Arc::new(EngineInner {
                store,
                gateway,
                monitor,
                clock,
                config,
                state,
                slots: Mutex::new(HashMap::new()),
            }),
            scheduler,
            poller: Mutex::new(None),
        }
    }

    /// Sends a new message, or queues it when that is not possible.
    ///
    /// While older messages of the consultation are still queued, the new
    /// one joins the queue behind them and a retry cycle is requested.
    ///
    /// Network and server failures are absorbed: the message comes back
    /// `Queued`. Only [`Error::Auth`] (the message is queued all the same)
    /// and [`Error::Store`] (the message is held in memory) are returned.
    pub async fn submit(
        &self,
        text: &str,
        consultation_id: &ConsultationId,
        sender_id: &str,
        sender_role: SenderRole,
    ) -> Result<Message> {
        self.inner
            .submit(text, consultation_id, sender_id, sender_role)
            .await
    }

    /// Fetches new gateway rows and returns the merged conversation.
    ///
    /// While offline, the view is built from local state without a request.
    pub async fn refresh(&self, consultation_id: &ConsultationId) -> Result<Vec<Message>> {
        self.inner.refresh(consultation_id).await
    }

    /// Registers an observer; its consultation joins the poll loop.
    pub fn subscribe(
        &self,
        consultation_id: ConsultationId,
        observer: Arc<dyn ConversationObserver>,
    ) -> SubscriptionId {
        self.inner.state.subscribe(consultation_id, observer)
    }

    /// Removes an observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.state.unsubscribe(id);
    }

    /// Receipt of a message this engine has seen confirmed.
    pub fn receipt(&self, consultation_id: &ConsultationId, client_id: &ClientId) -> Option<Receipt> {
        self.inner.state.confirmed_receipt(consultation_id, client_id)
    }

    /// Runs one retry cycle now.
    pub async fn flush(&self) -> FlushReport {
        self.scheduler.run_cycle().await
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn is_auth_suspended(&self) -> bool {
        self.inner.state.is_auth_suspended()
    }

    /// Clears the auth pause after the caller signed in again.
    pub fn reauthenticated(&self) {
        if self.inner.state.resume_auth() {
            info!("credentials renewed, resuming deliveries");
        }
        self.inner.state.request_flush();
    }

    /// Starts the poll loop and the retry scheduler.
    pub fn start(&self) {
        {
            let mut poller = lock(&self.poller);
            if poller.is_none() {
                let cancel = CancellationToken::new();
                let inner = Arc::clone(&self.inner);
                let token = cancel.clone();
                let handle = tokio::spawn(async move { inner.poll_loop(token).await });
                *poller = Some(Running { cancel, handle });
                info!(
                    poll_interval = ?self.inner.config.poll_interval,
                    "sync engine started"
                );
            }
        }
        self.scheduler.start();
    }

    /// Stops background work and waits for it. Pending entries stay stored.
    pub async fn stop(&self) {
        let poller = lock(&self.poller).take();
        if let Some(running) = poller {
            running.cancel.cancel();
            let _ = running.handle.await;
        }
        self.scheduler.stop().await;
        info!("sync engine stopped");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
