// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! A [`ClientId`] is minted on the sending device and never changes, so it is
//! the deduplication key between the local queue and the gateway's copy.
//! Gateway rows that carry no client id are given a deterministic one derived
//! from their [`RemoteId`], which keeps the merged view stable across polls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Namespace for client ids derived from gateway row ids.
const REMOTE_NAMESPACE: Uuid = Uuid::from_u128(0x3f2c_9a1e_5b7d_4c60_8e21_d4a7_0b95_c6e3);

/// Device-generated message identifier (random 128-bit, hyphenated text form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        ClientId(Uuid::new_v4())
    }

    /// Derives a stable id for a gateway row that did not echo one.
    pub fn for_remote(remote_id: &RemoteId) -> Self {
        ClientId(Uuid::new_v5(&REMOTE_NAMESPACE, remote_id.as_str().as_bytes()))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ClientId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(ClientId)
            .map_err(|_| Error::InvalidClientId(s.to_string()))
    }
}

/// Identifies a consultation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsultationId(String);

impl ConsultationId {
    /// Creates a consultation id, rejecting blank input.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::FieldEmpty {
                field: "consultation id",
            });
        }
        Ok(ConsultationId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConsultationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConsultationId::new(s)
    }
}

/// Identifier assigned by the gateway once a message is persisted remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId::new(s)
    }
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
