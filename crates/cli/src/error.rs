// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::sync::{GatewayError, StoreError};

/// All possible errors that can occur in the consultrs library.
///
/// Only [`Error::Auth`] and [`Error::Store`] are meant to reach an end user
/// from a send: network and server failures end up as queued messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not initialized: run 'consult init' first")]
    NotInitialized,

    #[error("already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}\n  hint: sign in again and set CONSULT_TOKEN; queued messages are kept")]
    Auth(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Core(#[from] consult_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Network(msg) => Error::Network(msg),
            GatewayError::Auth(msg) => Error::Auth(msg),
            GatewayError::Server { status, message } => Error::Server { status, message },
        }
    }
}

/// A specialized Result type for consultrs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
