// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;
use common::*;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE: &str = "/rest/v1/consultation_messages";

fn inserted(id: u64, body: &str) -> serde_json::Value {
    json!([{
        "id": id,
        "created_at": "2026-03-01T09:00:07+00:00",
        "consultation_id": "C1",
        "sender_id": "farm-17",
        "sender_type": "farmer",
        "message": body,
    }])
}

#[tokio::test(flavor = "multi_thread")]
async fn send_online_posts_to_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TABLE))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(inserted(42, "hello")))
        .expect(1)
        .mount(&server)
        .await;

    let temp = init_temp(&format!("{}/rest/v1", server.uri()));
    consult(&temp)
        .env("CONSULT_TOKEN", "user-token")
        .args(["send", "C1", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::diff("sent 42\n"));

    consult(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("no pending messages"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_token_keeps_message_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
        .mount(&server)
        .await;

    let temp = init_temp(&server.uri());
    consult(&temp)
        .args(["send", "C1", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"))
        .stderr(predicate::str::contains("CONSULT_TOKEN"));

    consult(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("queued  retries=0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_queues_then_flush_delivers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(inserted(7, "hello")))
        .mount(&server)
        .await;

    let temp = init_temp(&server.uri());
    let out = send(&temp, "C1", "hello");
    assert!(out.starts_with("queued "), "{out}");

    consult(&temp)
        .arg("flush")
        .assert()
        .success()
        .stdout(predicate::str::contains("sent 1, failed 0, deferred 0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn send_delivers_older_queued_messages_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(inserted(7, "ok")))
        .mount(&server)
        .await;

    let temp = init_temp(&server.uri());
    let out = send(&temp, "C1", "first");
    assert!(out.starts_with("queued "), "{out}");
    assert_eq!(send(&temp, "C1", "second"), "sent 7");

    let posted: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(posted, vec!["first", "first", "second"]);

    consult(&temp)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("no pending messages"));
}

#[tokio::test(flavor = "multi_thread")]
async fn history_merges_gateway_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE))
        .and(query_param("consultation_id", "eq.C1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "created_at": "2026-03-01T09:00:01+00:00",
                "consultation_id": "C1",
                "sender_id": "farm-17",
                "sender_type": "farmer",
                "message": "Bird appears lethargic",
            },
            {
                "id": 2,
                "created_at": "2026-03-01T09:04:00+00:00",
                "consultation_id": "C1",
                "sender_id": "vet-2",
                "sender_type": "vet",
                "message": "Any change in appetite?",
            },
        ])))
        .mount(&server)
        .await;

    let temp = init_temp(&format!("{}/rest/v1", server.uri()));
    let output = consult(&temp)
        .args(["history", "C1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "2026-03-01 09:00 farm-17 (reporter): Bird appears lethargic",
            "2026-03-01 09:04 vet-2 (specialist): Any change in appetite?",
        ]
    );
}
