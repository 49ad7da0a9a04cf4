// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock abstraction.
//!
//! Message creation times and retry backoff both read the clock through the
//! [`Clock`] trait so tests can drive time explicitly.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;

/// Source of the current wall clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Each call to [`Clock::now`] returns the current value and then advances it
/// by the configured step, so consecutive readings are strictly ordered.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    step: TimeDelta,
}

impl ManualClock {
    /// Creates a clock starting at `start` that does not advance on its own.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, TimeDelta::zero())
    }

    /// Creates a clock that advances by `step` after every reading.
    pub fn with_step(start: DateTime<Utc>, step: TimeDelta) -> Self {
        ManualClock {
            now: Mutex::new(start),
            step,
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        let current = *now;
        *now += self.step;
        current
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
