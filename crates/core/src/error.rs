// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for consult-core operations.

use thiserror::Error;

/// All possible errors that can occur in consult-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid message state transition: cannot go from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid message state: '{0}'\n  hint: valid states are: composing, queued, sending, sent, failed")]
    InvalidState(String),

    #[error("invalid sender role: '{0}'\n  hint: valid roles are: reporter, specialist")]
    InvalidRole(String),

    #[error("invalid client id: '{0}'")]
    InvalidClientId(String),

    #[error("{field} cannot be empty")]
    FieldEmpty { field: &'static str },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for consult-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
