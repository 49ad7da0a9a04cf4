// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// Gateway address nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

/// `consult` with a private state directory and no inherited settings.
pub fn consult(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("consult");
    cmd.arg("--state-dir")
        .arg(state.path())
        .env_remove("CONSULT_TOKEN")
        .env_remove("CONSULT_STATE_DIR")
        .env_remove("CONSULT_LOG");
    cmd
}

/// A state directory initialized against `gateway`.
pub fn init_temp(gateway: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    consult(&temp)
        .args(["init", "--gateway", gateway, "--sender", "farm-17"])
        .args(["--api-key", "anon-key"])
        .assert()
        .success();
    temp
}

/// Sends a message and returns stdout.
pub fn send(state: &TempDir, consultation: &str, text: &str) -> String {
    let output = consult(state)
        .args(["send", consultation, text])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
