// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! consult-core: Shared data model for consultation messaging
//!
//! This crate provides the message types, identifiers, clock abstraction and
//! the pure merge algorithm used by the `consult` sync engine.

pub mod clock;
pub mod error;
pub mod ids;
pub mod merge;
pub mod message;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use ids::{ClientId, ConsultationId, RemoteId};
pub use merge::{merge_view, Confirmation, MergeOutcome};
pub use message::{Message, MessageState, PendingEntry, Receipt, RemoteMessage, SenderRole};
