// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::sync::test_helpers::at;
use chrono::TimeDelta;
use consult_core::ManualClock;
use std::collections::VecDeque;

fn monitor() -> (Arc<ConnectivityMonitor>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at(0)));
    let monitor = Arc::new(ConnectivityMonitor::new(
        Arc::clone(&clock) as Arc<dyn Clock>
    ));
    (monitor, clock)
}

/// Probe that replays canned observations, then reports unreachable.
struct ScriptedProbe {
    results: Mutex<VecDeque<Result<bool, ProbeError>>>,
}

impl ScriptedProbe {
    fn new(results: Vec<Result<bool, ProbeError>>) -> Self {
        ScriptedProbe {
            results: Mutex::new(results.into()),
        }
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, ProbeError>> + Send + '_>> {
        let next = self.results.lock().unwrap().pop_front().unwrap_or(Ok(false));
        Box::pin(async move { next })
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[test]
fn test_starts_offline() {
    let (monitor, _clock) = monitor();
    assert_eq!(monitor.current_state(), ConnectivityState::Offline);
    assert!(!monitor.is_online());
    assert_eq!(monitor.last_transition(), at(0));
}

#[test]
fn test_report_only_counts_transitions() {
    let (monitor, clock) = monitor();

    clock.advance(TimeDelta::seconds(3));
    assert!(monitor.report(Ok(true)));
    assert_eq!(monitor.last_transition(), at(3));

    clock.advance(TimeDelta::seconds(3));
    assert!(!monitor.report(Ok(true)));
    assert_eq!(monitor.last_transition(), at(3));
    assert!(monitor.is_online());
}

#[test]
fn test_probe_errors_count_as_offline() {
    let (monitor, _clock) = monitor();
    monitor.report(Ok(true));

    assert!(monitor.report(Err(ProbeError::Timeout)));
    assert_eq!(monitor.current_state(), ConnectivityState::Offline);
    assert!(!monitor.report(Err(ProbeError::Failed("dns".to_string()))));
}

#[tokio::test]
async fn test_listeners_hear_each_transition_once() {
    let (monitor, _clock) = monitor();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        monitor.subscribe(move |state| seen.lock().unwrap().push(state));
    }
    monitor.start();

    monitor.report(Ok(true));
    monitor.report(Ok(true));
    monitor.report(Ok(false));
    monitor.report(Err(ProbeError::Timeout));
    wait_for(|| seen.lock().unwrap().len() >= 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectivityState::Online, ConnectivityState::Offline]
    );
    monitor.stop().await;
}

#[tokio::test]
async fn test_transitions_before_start_are_not_buffered() {
    let (monitor, _clock) = monitor();
    for _ in 0..1000 {
        monitor.report(Ok(true));
        monitor.report(Ok(false));
    }
    assert!(monitor.notify_rx.try_lock().unwrap().try_recv().is_err());

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        monitor.subscribe(move |state| seen.lock().unwrap().push(state));
    }
    monitor.start();
    monitor.report(Ok(true));
    wait_for(|| !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Online]);

    monitor.stop().await;
    monitor.report(Ok(false));
    assert!(monitor.notify_rx.try_lock().unwrap().try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribed_listener_is_not_called() {
    let (monitor, _clock) = monitor();
    let kept = Arc::new(Mutex::new(0));
    let dropped = Arc::new(Mutex::new(0));
    {
        let kept = Arc::clone(&kept);
        monitor.subscribe(move |_| *kept.lock().unwrap() += 1);
    }
    let id = {
        let dropped = Arc::clone(&dropped);
        monitor.subscribe(move |_| *dropped.lock().unwrap() += 1)
    };
    monitor.unsubscribe(id);
    monitor.start();

    monitor.report(Ok(true));
    wait_for(|| *kept.lock().unwrap() == 1).await;

    assert_eq!(*kept.lock().unwrap(), 1);
    assert_eq!(*dropped.lock().unwrap(), 0);
    monitor.stop().await;
}

#[tokio::test]
async fn test_probe_once_records_observation() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at(0)));
    let probe = Arc::new(ScriptedProbe::new(vec![Ok(true), Err(ProbeError::Timeout)]));
    let monitor = ConnectivityMonitor::new(clock).with_probe(probe, Duration::from_secs(5));

    assert_eq!(monitor.probe_once().await, ConnectivityState::Online);
    assert_eq!(monitor.probe_once().await, ConnectivityState::Offline);
}

#[tokio::test]
async fn test_probe_once_without_probe_keeps_state() {
    let (monitor, _clock) = monitor();
    monitor.report(Ok(true));
    assert_eq!(monitor.probe_once().await, ConnectivityState::Online);
}

#[tokio::test(start_paused = true)]
async fn test_probe_loop_follows_probe() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at(0)));
    let probe = Arc::new(ScriptedProbe::new(vec![Ok(false), Ok(true), Ok(true)]));
    let monitor = Arc::new(
        ConnectivityMonitor::new(clock).with_probe(probe, Duration::from_secs(5)),
    );
    monitor.start();

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(monitor.is_online());

    // Script exhausted: the probe now reports unreachable.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!monitor.is_online());

    monitor.stop().await;
}

#[tokio::test]
async fn test_tcp_probe_reachable_and_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let probe = TcpProbe::new(addr.clone(), Duration::from_secs(2));
    assert_eq!(probe.probe().await, Ok(true));

    drop(listener);
    assert_eq!(probe.probe().await, Ok(false));
}

#[test]
fn test_state_display() {
    assert_eq!(ConnectivityState::Online.to_string(), "online");
    assert_eq!(ConnectivityState::Offline.to_string(), "offline");
}
