// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-tolerant message delivery and conversation sync.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ submit ┌──────────────┐  append   ┌─────────────┐
//! │    Caller    │───────►│  SyncEngine  │──────────►│   Gateway   │
//! │ (CLI / app)  │◄───────│ (poll, merge)│◄──────────│   (trait)   │
//! └──────────────┘  views └──────────────┘ listSince └─────────────┘
//!                           │    ▲     │                    ▲
//!                   enqueue │    │     │ owns               │ append
//!                           ▼    │     ▼                    │
//!                  ┌──────────────┐  ┌────────────────┐     │
//!                  │ PendingStore │◄─│ RetryScheduler │─────┘
//!                  │   (SQLite)   │  │   (backoff)    │
//!                  └──────────────┘  └────────────────┘
//!                                          ▲
//!                        Offline → Online  │
//!                  ┌───────────────────────┴┐
//!                  │  ConnectivityMonitor   │
//!                  └────────────────────────┘
//! ```
//!
//! # Features
//!
//! - Direct send when online, durable queue otherwise
//! - Retry cycles on a timer and on reconnect, with capped exponential backoff
//! - Polling refresh with single-flight requests per consultation
//! - Merge of gateway history with local state into one duplicate-free view
//! - Injectable gateway, probe and clock for testing

mod connectivity;
mod engine;
mod gateway;
mod http;
mod scheduler;
mod store;

pub use connectivity::{
    ConnectivityMonitor, ConnectivityState, ListenerId, ProbeError, ReachabilityProbe, TcpProbe,
};
pub use engine::{ConversationObserver, SubscriptionId, SyncConfig, SyncEngine, SyncEvent};
pub use gateway::{Gateway, GatewayError, GatewayFuture, GatewayResult};
pub use http::HttpGateway;
pub use scheduler::{FlushReport, RetryPolicy, RetryScheduler};
pub use store::{PendingStore, StoreError, StoreResult};

#[cfg(test)]
mod test_helpers;
