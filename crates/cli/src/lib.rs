// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! consultrs - Offline-tolerant consultation messaging.
//!
//! This crate provides the sync subsystem behind the `consult` CLI: messages
//! written while the gateway is unreachable are kept in a SQLite queue and
//! delivered later, and gateway history is merged with local state into one
//! ordered, duplicate-free conversation.
//!
//! # Main Components
//!
//! - [`sync::SyncEngine`] - submit, refresh, observers and the poll loop
//! - [`sync::RetryScheduler`] - backoff-driven delivery of queued messages
//! - [`sync::PendingStore`] - durable queue of unconfirmed messages
//! - [`sync::ConnectivityMonitor`] - reachability with transition listeners
//! - [`sync::Gateway`] - the remote chat API, implemented by [`sync::HttpGateway`]
//! - [`Config`] - settings stored in `consult.toml`
//!
//! # Embedding
//!
//! ```rust,ignore
//! use consultrs::sync::{ConnectivityMonitor, HttpGateway, PendingStore, SyncConfig, SyncEngine};
//!
//! let store = Arc::new(PendingStore::open(&get_db_path(&state_dir))?);
//! let engine = SyncEngine::new(store, gateway, monitor, clock, SyncConfig::from_config(&config));
//! engine.start();
//! let msg = engine.submit("Bird appears lethargic", &consultation, "farm-17", SenderRole::Reporter).await?;
//! engine.stop().await;
//! ```

mod cli;
mod commands;
mod display;

pub mod config;
pub mod env;
pub mod error;
pub mod sync;

pub use cli::{Cli, Command, OutputFormat};
pub use config::{default_state_dir, get_db_path, init_state_dir, Config};
pub use error::{Error, Result};

/// Execute a CLI command. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(cli: Cli) -> Result<()> {
    let state_dir = cli
        .state_dir
        .or_else(env::state_dir)
        .unwrap_or_else(default_state_dir);
    match cli.command {
        Command::Init {
            gateway,
            sender,
            role,
            api_key,
        } => commands::init::run(&state_dir, gateway, sender, role, api_key),
        Command::Send {
            consultation,
            text,
            output,
        } => commands::block_on(commands::send::run(&state_dir, &consultation, &text, output)),
        Command::History {
            consultation,
            output,
        } => commands::block_on(commands::history::run(&state_dir, &consultation, output)),
        Command::Pending {
            consultation,
            output,
        } => commands::pending::run(&state_dir, consultation.as_deref(), output),
        Command::Flush { force, output } => {
            commands::block_on(commands::flush::run(&state_dir, force, output))
        }
        Command::Watch { consultation } => {
            commands::block_on(commands::watch::run(&state_dir, &consultation))
        }
    }
}
