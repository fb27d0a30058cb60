mod common;

use axum::http::StatusCode;
use common::{build_test_context, get, gzip, key_pair, post_json, send, Options, TEST_KEY};
use metrix_common::signing::Signer;
use metrix_storage::file::FileSnapshotStore;
use metrix_storage::SnapshotStore;
use serde_json::json;

#[tokio::test]
async fn counter_updates_accumulate_and_echo_the_record() {
    let ctx = build_test_context(Options::default());

    let first = post_json(&ctx.app, "/update/", r#"{"id":"PollCount","type":"counter","delta":5}"#).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = post_json(&ctx.app, "/update/", r#"{"id":"PollCount","type":"counter","delta":10}"#).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(
        second.json(),
        json!({"id":"PollCount","type":"counter","counter_value":15,"text_value":"15"})
    );
    assert!(second.headers.get("x-trace-id").is_some());
}

#[tokio::test]
async fn gauge_update_replaces_previous_value() {
    let ctx = build_test_context(Options::default());
    post_json(&ctx.app, "/update/", r#"{"id":"Alloc","type":"gauge","value":1.25}"#).await;
    let reply = post_json(&ctx.app, "/update/", r#"{"id":"Alloc","type":"gauge","value":2.5}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["gauge_value"], json!(2.5));
    assert_eq!(reply.json()["text_value"], json!("2.50000000000"));
}

#[tokio::test]
async fn gzip_request_body_is_accepted() {
    let ctx = build_test_context(Options::default());
    let body = gzip(br#"{"id":"Frees","type":"counter","delta":3}"#);
    let reply = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/json"), ("content-encoding", "gzip")],
        body,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(ctx.store.get("Frees").unwrap().counter_value(), Some(3));
}

#[tokio::test]
async fn invalid_updates_map_to_status_codes() {
    let ctx = build_test_context(Options::default());

    let unknown = post_json(&ctx.app, "/update/", r#"{"id":"X","type":"histogram","value":1.0}"#).await;
    assert_eq!(unknown.status, StatusCode::NOT_IMPLEMENTED);
    assert!(unknown.json()["err_msg"].is_string());
    assert!(unknown.json()["trace_id"].is_string());

    let malformed = post_json(&ctx.app, "/update/", "{not json").await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let missing_delta = post_json(&ctx.app, "/update/", r#"{"id":"C","type":"counter"}"#).await;
    assert_eq!(missing_delta.status, StatusCode::BAD_REQUEST);

    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn batch_applies_entries_in_order() {
    let ctx = build_test_context(Options::default());
    let reply = post_json(
        &ctx.app,
        "/updates/",
        r#"[{"id":"Hits","type":"counter","delta":1},
            {"id":"Hits","type":"counter","delta":2},
            {"id":"Temp","type":"gauge","value":36.6}]"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json().as_array().map(Vec::len), Some(3));
    assert_eq!(ctx.store.get("Hits").unwrap().counter_value(), Some(3));
    assert_eq!(ctx.store.get("Temp").unwrap().gauge_value(), Some(36.6));
}

#[tokio::test]
async fn batch_stops_at_first_bad_entry() {
    let ctx = build_test_context(Options::default());
    let reply = post_json(
        &ctx.app,
        "/updates/",
        r#"[{"id":"A","type":"counter","delta":1},
            {"id":"B","type":"bogus","value":1.0},
            {"id":"C","type":"counter","delta":1}]"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);
    assert!(ctx.store.get("A").is_ok());
    assert!(ctx.store.get("C").is_err());
}

#[tokio::test]
async fn value_lookup_returns_wire_shape() {
    let ctx = build_test_context(Options::default());
    post_json(&ctx.app, "/update/", r#"{"id":"Req","type":"counter","delta":7}"#).await;

    let found = post_json(&ctx.app, "/value/", r#"{"id":"Req","type":"counter"}"#).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.json(), json!({"id":"Req","type":"counter","delta":7}));

    let wrong_kind = post_json(&ctx.app, "/value/", r#"{"id":"Req","type":"gauge"}"#).await;
    assert_eq!(wrong_kind.status, StatusCode::NOT_FOUND);

    let absent = post_json(&ctx.app, "/value/", r#"{"id":"Nope","type":"counter"}"#).await;
    assert_eq!(absent.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_endpoints_update_and_read() {
    let ctx = build_test_context(Options::default());

    let reply = send(&ctx.app, "POST", "/update/gauge/Temp/2.5", &[], Vec::new()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "2.50000000000");

    send(&ctx.app, "POST", "/update/counter/Hits/4", &[], Vec::new()).await;
    send(&ctx.app, "POST", "/update/counter/Hits/6", &[], Vec::new()).await;

    assert_eq!(get(&ctx.app, "/value/gauge/Temp").await.text(), "2.50000000000");
    assert_eq!(get(&ctx.app, "/value/counter/Hits").await.text(), "10");
    assert_eq!(get(&ctx.app, "/value/counter/Missing").await.status, StatusCode::NOT_FOUND);
    assert_eq!(get(&ctx.app, "/value/summary/Hits").await.status, StatusCode::NOT_IMPLEMENTED);

    let bad = send(&ctx.app, "POST", "/update/counter/Hits/abc", &[], Vec::new()).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    let negative = send(&ctx.app, "POST", "/update/counter/Hits/-1", &[], Vec::new()).await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
    assert_eq!(get(&ctx.app, "/value/counter/Hits").await.text(), "10");
}

#[tokio::test]
async fn index_page_lists_every_metric_once() {
    let ctx = build_test_context(Options::default());
    send(&ctx.app, "POST", "/update/counter/Hits/1", &[], Vec::new()).await;
    send(&ctx.app, "POST", "/update/counter/Hits/1", &[], Vec::new()).await;
    send(&ctx.app, "POST", "/update/gauge/%3CTemp%3E/1", &[], Vec::new()).await;

    let page = get(&ctx.app, "/").await;
    assert_eq!(page.status, StatusCode::OK);
    let html = page.text();
    assert_eq!(html.matches("<li>Hits</li>").count(), 1);
    assert!(html.contains("<li>&lt;Temp&gt;</li>"));
}

#[tokio::test]
async fn ping_without_storage_is_ok() {
    let ctx = build_test_context(Options::default());
    let reply = get(&ctx.app, "/ping").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "pong");
}

#[tokio::test]
async fn signed_requests_are_verified_and_responses_signed() {
    let ctx = build_test_context(Options {
        key: Some(TEST_KEY),
        ..Options::default()
    });
    let signer = Signer::new(TEST_KEY).unwrap();
    let body = r#"{"id":"Temp","type":"gauge","value":1.5}"#;
    let sig = signer.sign(body.as_bytes());

    let good = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/json"), ("HashSHA256", sig.as_str())],
        body.as_bytes().to_vec(),
    )
    .await;
    assert_eq!(good.status, StatusCode::OK);
    let response_sig = good.headers.get("hashsha256").and_then(|v| v.to_str().ok()).unwrap();
    assert!(signer.verify(&good.body, response_sig).is_ok());

    let forged = Signer::new("other").unwrap().sign(body.as_bytes());
    let bad = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/json"), ("HashSHA256", forged.as_str())],
        body.as_bytes().to_vec(),
    )
    .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    // No signature header: accepted unverified.
    let unsigned = post_json(&ctx.app, "/update/", body).await;
    assert_eq!(unsigned.status, StatusCode::OK);
}

#[tokio::test]
async fn signature_is_checked_against_decompressed_body() {
    let ctx = build_test_context(Options {
        key: Some(TEST_KEY),
        ..Options::default()
    });
    let signer = Signer::new(TEST_KEY).unwrap();
    let body = br#"{"id":"Hits","type":"counter","delta":2}"#;
    let sig = signer.sign(body);
    let reply = send(
        &ctx.app,
        "POST",
        "/update/",
        &[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
            ("HashSHA256", sig.as_str()),
        ],
        gzip(body),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn encrypted_body_is_decrypted_before_decode() {
    let (encryptor, decryptor) = key_pair();
    let ctx = build_test_context(Options {
        decryptor: Some(decryptor),
        ..Options::default()
    });

    let cipher = encryptor
        .encrypt(br#"{"id":"Secret","type":"gauge","value":42.0}"#)
        .unwrap();
    let reply = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/octet-stream")],
        cipher,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(ctx.store.get("Secret").unwrap().gauge_value(), Some(42.0));

    let plain = post_json(&ctx.app, "/update/", r#"{"id":"Secret","type":"gauge","value":1.0}"#).await;
    assert_eq!(plain.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trusted_subnet_rejects_outside_and_missing_addresses() {
    let ctx = build_test_context(Options {
        trusted_subnet: Some("10.0.0.0/8"),
        ..Options::default()
    });
    let body = br#"{"id":"Hits","type":"counter","delta":1}"#.to_vec();

    let missing = send(&ctx.app, "POST", "/update/", &[("content-type", "application/json")], body.clone()).await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert!(missing.json()["trace_id"].as_str().is_some_and(|t| !t.is_empty()));

    let outside = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/json"), ("X-Real-IP", "192.168.0.9")],
        body.clone(),
    )
    .await;
    assert_eq!(outside.status, StatusCode::FORBIDDEN);

    let inside = send(
        &ctx.app,
        "POST",
        "/update/",
        &[("content-type", "application/json"), ("X-Real-IP", "10.1.2.3")],
        body,
    )
    .await;
    assert_eq!(inside.status, StatusCode::OK);
    assert_eq!(ctx.store.get("Hits").unwrap().counter_value(), Some(1));
}

#[tokio::test]
async fn synchronous_persistence_writes_after_each_ingest() {
    let ctx = build_test_context(Options {
        sync_file: true,
        ..Options::default()
    });
    post_json(&ctx.app, "/update/", r#"{"id":"Hits","type":"counter","delta":2}"#).await;
    post_json(&ctx.app, "/update/", r#"{"id":"Temp","type":"gauge","value":0.5}"#).await;

    let saved = FileSnapshotStore::new(ctx.snapshot_path()).load().unwrap();
    assert_eq!(saved, ctx.store.snapshot());
    assert_eq!(get(&ctx.app, "/ping").await.status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_body_is_rejected_instead_of_emptied() {
    let ctx = build_test_context(Options::default());
    let padding = " ".repeat(2 * 1024 * 1024);
    let body = format!(r#"{{"id":"Hits","type":"counter","delta":1}}{padding}"#);

    let reply = post_json(&ctx.app, "/update/", &body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["err_msg"]
        .as_str()
        .is_some_and(|m| m.contains("request body")));
    assert!(reply.headers.get("x-trace-id").is_some());
    assert!(ctx.store.is_empty());
}
