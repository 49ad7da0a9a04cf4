// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;

#[test]
fn test_check_passes_ordinary_failures() {
    let report = FlushReport {
        failed: 1,
        deferred: 2,
        ..FlushReport::default()
    };
    assert!(check(&report).is_ok());
}

#[test]
fn test_check_fails_on_auth() {
    let report = FlushReport {
        deferred: 1,
        auth_required: true,
        ..FlushReport::default()
    };
    let err = check(&report).unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert!(err.to_string().contains("CONSULT_TOKEN"));
}
