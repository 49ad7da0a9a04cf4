// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod flush;
pub mod history;
pub mod init;
pub mod pending;
pub mod send;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use consult_core::{Clock, ConsultationId, SystemClock};
use tracing::debug;

use crate::config::{get_db_path, Config};
use crate::error::{Error, Result};
use crate::sync::{
    ConnectivityMonitor, Gateway, HttpGateway, PendingStore, SyncConfig, SyncEngine, TcpProbe,
};

/// Everything a networked command needs, wired from the state directory.
pub struct Session {
    pub config: Config,
    pub store: Arc<PendingStore>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub engine: SyncEngine,
}

impl Session {
    /// Loads config, opens the store and builds the engine.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let config = Config::load(state_dir)?;
        let store = open_store(state_dir)?;

        let gateway: Arc<dyn Gateway> =
            Arc::new(HttpGateway::new(&config.gateway, crate::env::token())?);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut monitor = ConnectivityMonitor::new(Arc::clone(&clock));
        if let Some(addr) = config.probe_addr() {
            debug!(%addr, "probing gateway reachability");
            let probe = TcpProbe::new(
                addr,
                Duration::from_millis(config.connectivity.probe_timeout_ms),
            );
            monitor = monitor.with_probe(
                Arc::new(probe),
                Duration::from_secs(config.connectivity.probe_interval_secs),
            );
        }
        let monitor = Arc::new(monitor);

        let engine = SyncEngine::new(
            Arc::clone(&store),
            gateway,
            Arc::clone(&monitor),
            clock,
            SyncConfig::from_config(&config),
        );

        Ok(Session {
            config,
            store,
            monitor,
            engine,
        })
    }

    /// Fails unless a sender id is configured.
    pub fn sender_id(&self) -> Result<&str> {
        let sender_id = self.config.identity.sender_id.trim();
        if sender_id.is_empty() {
            return Err(Error::Config(
                "identity.sender_id is not set in consult.toml".to_string(),
            ));
        }
        Ok(sender_id)
    }
}

/// Opens the pending store of an initialized state directory.
pub fn open_store(state_dir: &Path) -> Result<Arc<PendingStore>> {
    if !state_dir.join(crate::config::CONFIG_FILE_NAME).exists() {
        return Err(Error::NotInitialized);
    }
    Ok(Arc::new(PendingStore::open(&get_db_path(state_dir))?))
}

pub fn parse_consultation(id: &str) -> Result<ConsultationId> {
    Ok(ConsultationId::new(id)?)
}

/// Runs a command body on a fresh multi-thread runtime.
pub fn block_on<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}
