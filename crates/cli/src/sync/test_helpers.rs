// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use consult_core::{
    Clock, ConsultationId, ManualClock, Message, Receipt, RemoteId, RemoteMessage, SenderRole,
};

use super::{
    ConnectivityMonitor, ConversationObserver, Gateway, GatewayError, GatewayFuture,
    PendingStore, SyncConfig, SyncEngine, SyncEvent,
};

/// Fixed test epoch plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

pub fn consultation(id: &str) -> ConsultationId {
    ConsultationId::new(id).unwrap()
}

/// A reporter message composed at `at(created)`.
pub fn compose(consultation_id: &str, body: &str, created: i64) -> Message {
    Message::compose(
        consultation(consultation_id),
        "reporter-1",
        SenderRole::Reporter,
        body,
        at(created),
    )
    .unwrap()
}

pub fn receipt(remote_id: &str, secs: i64) -> Receipt {
    Receipt {
        remote_id: RemoteId::new(remote_id),
        remote_created_at: at(secs),
    }
}

/// What the mock does with the next append.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Store the row and confirm it.
    Accept,
    /// Reject without storing.
    Fail(GatewayError),
    /// Store the row but report a network error, as when a response is lost.
    LoseResponse,
}

/// In-memory gateway with scripted failures.
pub struct MockGateway {
    rows: Mutex<Vec<RemoteMessage>>,
    next_id: AtomicU64,
    echo_client_id: bool,
    append_script: Mutex<VecDeque<Outcome>>,
    list_script: Mutex<VecDeque<GatewayError>>,
    attempts: Mutex<Vec<Message>>,
    list_calls: AtomicUsize,
    list_delay: Mutex<Duration>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A gateway that drops client ids, forcing heuristic matching.
    pub fn without_echo() -> Self {
        Self::build(false)
    }

    fn build(echo_client_id: bool) -> Self {
        MockGateway {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            echo_client_id,
            append_script: Mutex::new(VecDeque::new()),
            list_script: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            list_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Makes the next assigned remote id `r-{id}`.
    pub fn set_next_id(&self, id: u64) {
        self.next_id.store(id, Ordering::SeqCst);
    }

    pub fn script(&self, outcome: Outcome) {
        self.append_script.lock().unwrap().push_back(outcome);
    }

    pub fn fail_next_list(&self, error: GatewayError) {
        self.list_script.lock().unwrap().push_back(error);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn attempted_bodies(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn rows(&self) -> Vec<RemoteMessage> {
        self.rows.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Adds a row written by another participant.
    pub fn insert_remote(&self, consultation_id: &str, sender_id: &str, body: &str) -> RemoteMessage {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = RemoteMessage {
            remote_id: RemoteId::new(format!("r-{id}")),
            remote_created_at: server_time(id),
            consultation_id: consultation(consultation_id),
            sender_id: sender_id.to_string(),
            sender_role: SenderRole::Specialist,
            body: body.to_string(),
            client_id: None,
        };
        self.rows.lock().unwrap().push(row.clone());
        row
    }

    fn store_row(&self, message: &Message) -> Receipt {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = RemoteMessage {
            remote_id: RemoteId::new(format!("r-{id}")),
            remote_created_at: server_time(id),
            consultation_id: message.consultation_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_role: message.sender_role,
            body: message.body.clone(),
            client_id: self.echo_client_id.then_some(message.client_id),
        };
        let receipt = Receipt {
            remote_id: row.remote_id.clone(),
            remote_created_at: row.remote_created_at,
        };
        self.rows.lock().unwrap().push(row);
        receipt
    }
}

/// Server clock: shortly after the test epoch, one second per row id.
pub fn server_time(id: u64) -> DateTime<Utc> {
    at(30 + i64::try_from(id).unwrap())
}

impl Gateway for MockGateway {
    fn append<'a>(&'a self, message: &'a Message) -> GatewayFuture<'a, Receipt> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(message.clone());
            let outcome = self
                .append_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Accept);
            match outcome {
                Outcome::Accept => Ok(self.store_row(message)),
                Outcome::Fail(error) => Err(error),
                Outcome::LoseResponse => {
                    self.store_row(message);
                    Err(GatewayError::Network("connection reset".to_string()))
                }
            }
        })
    }

    fn list_since<'a>(
        &'a self,
        consultation_id: &'a ConsultationId,
        cursor: Option<DateTime<Utc>>,
    ) -> GatewayFuture<'a, Vec<RemoteMessage>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.list_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = self.list_script.lock().unwrap().pop_front() {
                return Err(error);
            }
            let mut rows: Vec<RemoteMessage> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.consultation_id == *consultation_id)
                .filter(|r| cursor.map_or(true, |c| r.remote_created_at >= c))
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.remote_created_at.cmp(&b.remote_created_at));
            Ok(rows)
        })
    }
}

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    views: Mutex<Vec<Vec<Message>>>,
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn views(&self) -> Vec<Vec<Message>> {
        self.views.lock().unwrap().clone()
    }

    pub fn last_view(&self) -> Option<Vec<Message>> {
        self.views.lock().unwrap().last().cloned()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ConversationObserver for RecordingObserver {
    fn on_view(&self, _consultation_id: &ConsultationId, view: &[Message]) {
        self.views.lock().unwrap().push(view.to_vec());
    }

    fn on_event(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// An engine wired to in-memory collaborators.
pub struct Harness {
    pub engine: SyncEngine,
    pub store: Arc<PendingStore>,
    pub gateway: Arc<MockGateway>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MockGateway::new(), SyncConfig::default())
    }

    pub fn with(gateway: MockGateway, config: SyncConfig) -> Self {
        let clock = Arc::new(ManualClock::with_step(at(0), TimeDelta::seconds(1)));
        let store = Arc::new(PendingStore::open_in_memory().unwrap());
        let gateway = Arc::new(gateway);
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::clone(&clock) as Arc<dyn Clock>
        ));
        let engine = SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn Gateway>,
            Arc::clone(&monitor),
            Arc::clone(&clock) as Arc<dyn Clock>,
            config,
        );
        Harness {
            engine,
            store,
            gateway,
            monitor,
            clock,
        }
    }

    pub fn online(&self) {
        self.monitor.report(Ok(true));
    }

    pub fn offline(&self) {
        self.monitor.report(Ok(false));
    }

    pub async fn submit(&self, consultation_id: &str, body: &str) -> Message {
        self.engine
            .submit(
                body,
                &consultation(consultation_id),
                "reporter-1",
                SenderRole::Reporter,
            )
            .await
            .unwrap()
    }
}

pub fn bodies(view: &[Message]) -> Vec<&str> {
    view.iter().map(|m| m.body.as_str()).collect()
}
