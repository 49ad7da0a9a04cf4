// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reachability tracking with edge-triggered listeners.
//!
//! The monitor keeps the last known [`ConnectivityState`] in an atomic so
//! reads never block. Observations come either from the background probe
//! loop or from [`ConnectivityMonitor::report`]. Only transitions are
//! forwarded to listeners, and they are delivered from a separate notifier
//! task so a slow listener never stalls the probe. Transitions are only
//! queued for that task while the monitor is started.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use consult_core::Clock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const STATE_OFFLINE: u8 = 0;
const STATE_ONLINE: u8 = 1;

/// Process-wide reachability of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    fn from_u8(value: u8) -> Self {
        if value == STATE_ONLINE {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectivityState::Online => STATE_ONLINE,
            ConnectivityState::Offline => STATE_OFFLINE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for reachability probes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("probe failed: {0}")]
    Failed(String),
}

/// Source of reachability observations.
pub trait ReachabilityProbe: Send + Sync {
    /// Returns whether the gateway looks reachable right now.
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, ProbeError>> + Send + '_>>;
}

/// Probe that dials a TCP address with a timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        TcpProbe {
            addr: addr.into(),
            timeout,
        }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, ProbeError>> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
                Ok(Ok(_)) => Ok(true),
                Ok(Err(e)) => {
                    tracing::debug!(addr = %self.addr, error = %e, "probe connect failed");
                    Ok(false)
                }
                Err(_) => Err(ProbeError::Timeout),
            }
        })
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

struct Shared {
    state: AtomicU8,
    /// Last transition time in milliseconds since the epoch.
    since_ms: AtomicI64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    /// Serializes state swaps with their notifications.
    transition: Mutex<()>,
    /// Set while the notifier task is draining `notify_tx`.
    notifying: AtomicBool,
    notify_tx: mpsc::UnboundedSender<ConnectivityState>,
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Tracks whether the gateway is reachable.
pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
    notify_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ConnectivityState>>>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<Running>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor fed only through [`ConnectivityMonitor::report`].
    ///
    /// The initial state is `Offline` until the first observation.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            state: AtomicU8::new(STATE_OFFLINE),
            since_ms: AtomicI64::new(clock.now().timestamp_millis()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            transition: Mutex::new(()),
            notifying: AtomicBool::new(false),
            notify_tx,
        };
        ConnectivityMonitor {
            shared: Arc::new(shared),
            notify_rx: Arc::new(tokio::sync::Mutex::new(notify_rx)),
            probe: None,
            interval: Duration::from_secs(5),
            clock,
            running: Mutex::new(None),
        }
    }

    /// Attaches a probe polled every `interval` once started.
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>, interval: Duration) -> Self {
        self.probe = Some(probe);
        self.interval = interval;
        self
    }

    /// Returns the last known state without blocking.
    pub fn current_state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_online(&self) -> bool {
        self.current_state() == ConnectivityState::Online
    }

    /// Time of the last transition (or of construction).
    pub fn last_transition(&self) -> DateTime<Utc> {
        let ms = self.shared.since_ms.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    /// Records one observation. An `Err` counts as offline.
    ///
    /// Returns true when the observation changed the state.
    pub fn report(&self, observation: Result<bool, ProbeError>) -> bool {
        let next = match observation {
            Ok(true) => ConnectivityState::Online,
            Ok(false) => ConnectivityState::Offline,
            Err(e) => {
                tracing::debug!(error = %e, "reachability unknown, assuming offline");
                ConnectivityState::Offline
            }
        };

        let _guard = self
            .shared
            .transition
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let previous = self.shared.state.swap(next.as_u8(), Ordering::AcqRel);
        if previous == next.as_u8() {
            return false;
        }
        self.shared
            .since_ms
            .store(self.clock.now().timestamp_millis(), Ordering::Release);
        tracing::info!(
            from = %ConnectivityState::from_u8(previous),
            to = %next,
            "connectivity changed"
        );
        if self.shared.notifying.load(Ordering::Acquire) {
            // Receiver lives as long as the monitor, so send only fails during drop.
            let _ = self.shared.notify_tx.send(next);
        }
        true
    }

    /// Runs the probe once and records the result.
    ///
    /// Without a probe the state is left unchanged.
    pub async fn probe_once(&self) -> ConnectivityState {
        if let Some(probe) = &self.probe {
            let observation = probe.probe().await;
            self.report(observation);
        }
        self.current_state()
    }

    /// Registers a listener invoked once per transition.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(existing, _)| *existing != id);
    }

    /// Spawns the notifier task and, if a probe is attached, the probe loop.
    ///
    /// Calling `start` on a running monitor does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return;
        }

        // Drop transitions left over from an earlier run.
        if let Ok(mut rx) = self.notify_rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
        self.shared.notifying.store(true, Ordering::Release);

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        handles.push(tokio::spawn(notify_listeners(
            Arc::clone(&self.shared),
            Arc::clone(&self.notify_rx),
            cancel.clone(),
        )));

        if self.probe.is_some() {
            let monitor = Arc::clone(self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                monitor.probe_loop(cancel).await;
            }));
        }

        *running = Some(Running { cancel, handles });
    }

    /// Stops background tasks and waits for them to finish.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            self.shared.notifying.store(false, Ordering::Release);
            running.cancel.cancel();
            for handle in running.handles {
                let _ = handle.await;
            }
        }
    }

    async fn probe_loop(&self, cancel: CancellationToken) {
        let Some(probe) = self.probe.clone() else {
            return;
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let observation = tokio::select! {
                _ = cancel.cancelled() => return,
                observation = probe.probe() => observation,
            };
            self.report(observation);
        }
    }
}

/// Delivers queued transitions to a snapshot of the listeners.
async fn notify_listeners(
    shared: Arc<Shared>,
    notify_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ConnectivityState>>>,
    cancel: CancellationToken,
) {
    let mut rx = notify_rx.lock().await;
    loop {
        let state = tokio::select! {
            _ = cancel.cancelled() => return,
            state = rx.recv() => match state {
                Some(state) => state,
                None => return,
            },
        };
        let listeners: Vec<Listener> = shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
