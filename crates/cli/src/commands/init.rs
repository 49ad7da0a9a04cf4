// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use consult_core::SenderRole;

use crate::config::{get_db_path, init_state_dir, Config};
use crate::error::Result;
use crate::sync::PendingStore;

pub fn run(
    state_dir: &Path,
    gateway: String,
    sender: String,
    role: SenderRole,
    api_key: Option<String>,
) -> Result<()> {
    let mut config = Config::new(&gateway, sender.trim(), role)?;
    if let Some(key) = api_key {
        config.gateway.api_key = key;
    }

    let config_path = init_state_dir(state_dir, &config)?;

    // Create the queue now so a bad location fails here, not on first send.
    PendingStore::open(&get_db_path(state_dir))?;

    println!("Initialized consult at {}", config_path.display());
    println!("Gateway: {}", config.gateway.url);
    println!("Sender: {} ({})", config.identity.sender_id, config.identity.sender_role);
    Ok(())
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
