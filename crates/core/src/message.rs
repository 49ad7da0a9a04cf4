// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message model and delivery state machine.
//!
//! State transitions:
//!
//! ```text
//! Composing ──► Sending ──► Sent
//!     │            │  ▲
//!     ▼            ▼  │
//!   Queued ◄──── Failed
//! ```
//!
//! `Sent` is terminal and always carries the gateway's id and timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::{ClientId, ConsultationId, RemoteId};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// Field reporter raising a case.
    Reporter,
    /// Specialist answering it.
    Specialist,
}

impl SenderRole {
    /// Returns the string representation used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Reporter => "reporter",
            SenderRole::Specialist => "specialist",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // "farmer" and "vet" are the legacy gateway spellings.
        match s.to_lowercase().as_str() {
            "reporter" | "farmer" => Ok(SenderRole::Reporter),
            "specialist" | "vet" => Ok(SenderRole::Specialist),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Created locally, no delivery decision yet.
    Composing,
    /// Durably queued, waiting for a flush.
    Queued,
    /// An append is in flight.
    Sending,
    /// Confirmed by the gateway.
    Sent,
    /// Last attempt failed; waiting for backoff to elapse.
    Failed,
}

impl MessageState {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Composing => "composing",
            MessageState::Queued => "queued",
            MessageState::Sending => "sending",
            MessageState::Sent => "sent",
            MessageState::Failed => "failed",
        }
    }

    /// Check if a transition from this state to target is valid.
    pub fn can_transition_to(&self, target: MessageState) -> bool {
        use MessageState::*;
        matches!(
            (self, target),
            (Composing, Sending)
                | (Composing, Queued)
                | (Sending, Sent)
                | (Sending, Queued)
                | (Sending, Failed)
                | (Queued, Sending)
                | (Queued, Sent)
                | (Queued, Failed)
                | (Failed, Queued)
                | (Failed, Sending)
                | (Failed, Sent)
        )
    }

    /// Returns true for states that live in the pending store.
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageState::Queued | MessageState::Failed)
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "composing" => Ok(MessageState::Composing),
            "queued" => Ok(MessageState::Queued),
            "sending" => Ok(MessageState::Sending),
            "sent" => Ok(MessageState::Sent),
            "failed" => Ok(MessageState::Failed),
            _ => Err(Error::InvalidState(s.to_string())),
        }
    }
}

/// A single consultation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub client_id: ClientId,
    pub consultation_id: ConsultationId,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub body: String,
    /// Device time at creation; orders the message until it is confirmed.
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    /// Gateway time; the authoritative ordering key once present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_created_at: Option<DateTime<Utc>>,
    pub state: MessageState,
}

impl Message {
    /// Composes a new outbound message with a fresh client id.
    pub fn compose(
        consultation_id: ConsultationId,
        sender_id: impl Into<String>,
        sender_role: SenderRole,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(Error::FieldEmpty { field: "body" });
        }
        let sender_id = sender_id.into();
        if sender_id.trim().is_empty() {
            return Err(Error::FieldEmpty { field: "sender id" });
        }

        Ok(Message {
            client_id: ClientId::generate(),
            consultation_id,
            sender_id,
            sender_role,
            body,
            created_at,
            remote_id: None,
            remote_created_at: None,
            state: MessageState::Composing,
        })
    }

    /// Moves the message to `target`, rejecting invalid transitions.
    ///
    /// Use [`Message::mark_sent`] to reach `Sent`.
    pub fn transition(&mut self, target: MessageState) -> Result<()> {
        if target == MessageState::Sent || !self.state.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    /// Records gateway confirmation.
    pub fn mark_sent(&mut self, receipt: Receipt) -> Result<()> {
        if !self.state.can_transition_to(MessageState::Sent) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: MessageState::Sent.to_string(),
            });
        }
        if receipt.remote_id.as_str().is_empty() {
            return Err(Error::FieldEmpty { field: "remote id" });
        }
        self.remote_id = Some(receipt.remote_id);
        self.remote_created_at = Some(receipt.remote_created_at);
        self.state = MessageState::Sent;
        Ok(())
    }

    /// Returns true once the gateway has confirmed the message.
    pub fn is_confirmed(&self) -> bool {
        self.state == MessageState::Sent
            && self.remote_id.is_some()
            && self.remote_created_at.is_some()
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub remote_id: RemoteId,
    pub remote_created_at: DateTime<Utc>,
}

/// A message as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub remote_id: RemoteId,
    pub remote_created_at: DateTime<Utc>,
    pub consultation_id: ConsultationId,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub body: String,
    /// Present only when the gateway echoes the client id back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

/// A durable record of a message not yet confirmed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// The queued message; its state is `Queued` or `Failed`.
    pub message: Message,
    /// Number of failed delivery attempts.
    pub retry_count: u32,
    /// When the last attempt finished, if any.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Insertion sequence; breaks ties between equal creation times.
    pub seq: i64,
}

impl PendingEntry {
    pub fn client_id(&self) -> ClientId {
        self.message.client_id
    }

    pub fn consultation_id(&self) -> &ConsultationId {
        &self.message.consultation_id
    }

    pub fn state(&self) -> MessageState {
        self.message.state
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
