// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote chat gateway abstraction.
//!
//! Provides a trait-based gateway layer that enables:
//! - The HTTP gateway for production
//! - Scripted gateways for unit testing
//!
//! The gateway is not assumed to deduplicate by client id: a retried append
//! may create a second remote row, which the merge collapses.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use consult_core::{ConsultationId, Message, Receipt, RemoteMessage};

/// Error type for gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure or timeout. Always retried.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials were rejected. Retried only after re-authentication.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The gateway answered with an error status. Retried with backoff.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl GatewayError {
    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by [`Gateway`] methods.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Request/response access to the remote message collection.
pub trait Gateway: Send + Sync {
    /// Appends one message and returns the gateway's id and timestamp.
    fn append<'a>(&'a self, message: &'a Message) -> GatewayFuture<'a, Receipt>;

    /// Lists a consultation's messages ordered by server time.
    ///
    /// With a cursor, only messages created at or after it are returned.
    /// Without one, the full history is returned.
    fn list_since<'a>(
        &'a self,
        consultation_id: &'a ConsultationId,
        cursor: Option<DateTime<Utc>>,
    ) -> GatewayFuture<'a, Vec<RemoteMessage>>;
}
