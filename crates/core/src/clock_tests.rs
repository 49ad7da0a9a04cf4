// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

#[test]
fn manual_clock_is_frozen_by_default() {
    let clock = ManualClock::new(start());
    assert_eq!(clock.now(), start());
    assert_eq!(clock.now(), start());
}

#[test]
fn manual_clock_steps_after_each_reading() {
    let clock = ManualClock::with_step(start(), TimeDelta::seconds(1));
    let a = clock.now();
    let b = clock.now();
    assert_eq!(b - a, TimeDelta::seconds(1));
}

#[test]
fn manual_clock_advance_and_set() {
    let clock = ManualClock::new(start());
    clock.advance(TimeDelta::minutes(5));
    assert_eq!(clock.now(), start() + TimeDelta::minutes(5));

    clock.set(start());
    assert_eq!(clock.now(), start());
}

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
