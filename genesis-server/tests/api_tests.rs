//! Integration tests for the HTTP API.

mod common;

use axum::http::StatusCode;
use common::{SECRET, TestOptions, TestServer, download, json_request, raw_request};
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server_name"], "node-a");
    assert_eq!(body["categories"], 1);
}

#[tokio::test]
async fn test_register_unit_attests_without_peers() {
    let server = TestServer::new().await;
    server.write_unit(0);

    let (status, body) = server.register(0, 7, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["index"], 0);
    assert_eq!(body["data"]["epoch"], 7);
    assert_eq!(body["data"]["rounds"].as_array().unwrap().len(), 2);

    server.settle_rounds().await;

    let (status, body) = json_request(&server.router, "GET", "/api/rounds", None).await;
    assert_eq!(status, StatusCode::OK);
    let rounds = body["data"].as_array().unwrap();
    assert_eq!(rounds.len(), 2);
    assert!(rounds.iter().all(|round| round["phase"] == "attested"));

    let (status, _, body) = download(&server.router, "/md5/mainnet-7-full.g.md5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 32);
    assert!(body.iter().all(u8::is_ascii_hexdigit));
}

#[tokio::test]
async fn test_register_unit_rejections() {
    let server = TestServer::new().await;
    server.write_unit(0);

    let (status, body) = server.register(0, 7, "wrong").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, body) = server.register(3, 7, SECRET).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "sequence_gap");

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/new/",
        Some(json!({"index": 0, "epoch": 7, "category": "testnet", "pw": SECRET})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(server.state.ledger.len("mainnet").await, Some(0));
    assert!(server.state.scheduler.list().is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_get_error_envelope() {
    let server = TestServer::new().await;
    let json = Some("application/json");

    for uri in ["/new/", "/hash/"] {
        for (content_type, body) in [
            (json, "{\"index\": 0,"),
            (json, "{\"index\": \"zero\"}"),
            (None, "{}"),
        ] {
            let (status, response) = raw_request(&server.router, uri, content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(response["success"], false);
            assert_eq!(response["code"], "bad_request");
            assert!(response["error"].is_string());
        }
    }

    assert_eq!(server.state.ledger.len("mainnet").await, Some(0));
}

#[tokio::test]
async fn test_duplicate_registration_is_a_gap() {
    let server = TestServer::new().await;
    server.write_unit(0);

    let (status, _) = server.register(0, 7, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.register(0, 7, SECRET).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(server.state.ledger.len("mainnet").await, Some(1));
}

#[tokio::test]
async fn test_dynamic_download_full_and_range() {
    let server = TestServer::new().await;
    let mut unit0 = server.write_unit(0);
    let unit1 = server.write_unit(1);
    server.register(0, 7, SECRET).await;
    server.register(1, 8, SECRET).await;

    // blocks 0..=1, then epochs 0..=1, then evm 0..=1
    let expected: Vec<u8> = [
        "brs-0:0;brs-1:1;",
        "ers-0:0;ers-1:1;",
        "evm-0:0;evm-1:1;",
    ]
    .concat()
    .into_bytes();
    unit0.extend(unit1);
    assert_eq!(unit0.len(), expected.len());

    let (status, headers, body) = download(&server.router, "/dynamic/mainnet-8-full.g", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
    assert_eq!(headers["content-length"], expected.len().to_string().as_str());
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"mainnet-8-full.g\""
    );

    let (status, headers, body) =
        download(&server.router, "/dynamic/mainnet-8-full.g", Some("bytes=5-20")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &expected[5..=20]);
    assert_eq!(
        headers["content-range"],
        format!("bytes 5-20/{}", expected.len()).as_str()
    );

    let (status, _, body) =
        download(&server.router, "/dynamic/mainnet-8-full.g", Some("bytes=40-")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &expected[40..]);

    // epoch 7 resolves to unit 0 only
    let (status, _, body) = download(&server.router, "/dynamic/mainnet-7-none.g", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"brs-0:0;ers-0:0;");

    server.settle_rounds().await;
}

#[tokio::test]
async fn test_range_errors() {
    let server = TestServer::new().await;
    server.write_unit(0);
    server.register(0, 7, SECRET).await;

    let (status, headers, _) =
        download(&server.router, "/dynamic/mainnet-7-full.g", Some("bytes=500-600")).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers["content-range"], "bytes */24");

    let (status, _, _) =
        download(&server.router, "/dynamic/mainnet-7-full.g", Some("bytes=0-1,4-5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) =
        download(&server.router, "/dynamic/mainnet-7-full.g", Some("items=0-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    server.settle_rounds().await;
}

#[tokio::test]
async fn test_download_not_found() {
    let server = TestServer::new().await;
    server.write_unit(0);
    server.register(0, 7, SECRET).await;

    for uri in [
        "/dynamic/mainnet-9-full.g",
        "/dynamic/mainnet-7-bogus.g",
        "/dynamic/testnet-7-full.g",
        "/dynamic/garbage",
        "/static/missing.g",
        "/static/..%2Fdb.json",
        "/md5/mainnet-9-full.g.md5",
    ] {
        let (status, _, _) = download(&server.router, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }

    std::fs::remove_file(
        genesis_core::UnitType::Evm.unit_path(&server.units_path(), 0),
    )
    .unwrap();
    let (status, _, _) = download(&server.router, "/dynamic/mainnet-7-full.g", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.settle_rounds().await;
}

#[tokio::test]
async fn test_static_download() {
    let server = TestServer::new().await;

    let (status, headers, body) = download(&server.router, "/static/legacy.g", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"legacy genesis");
    assert_eq!(headers["content-type"], "application/octet-stream");

    let (status, _, body) = download(&server.router, "/static/legacy.g", Some("bytes=7-")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, b"genesis");
}

#[tokio::test]
async fn test_catalog_lists_latest_artifacts() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/api/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"][0]["name"], "mainnet");
    assert_eq!(body["genesis_files"].as_array().unwrap().len(), 1);
    assert!(body["generated_at"].is_string());

    server.write_unit(0);
    server.register(0, 7, SECRET).await;
    server.settle_rounds().await;

    let (_, body) = json_request(&server.router, "GET", "/api/", None).await;
    let files = body["genesis_files"].as_array().unwrap();
    assert_eq!(files.len(), 3);
    let full = files
        .iter()
        .find(|file| file["name"] == "mainnet-7-full.g")
        .unwrap();
    assert_eq!(full["static"], false);
    assert_eq!(full["epoch"], 7);
    assert_eq!(full["file_size"], 24);
    assert_eq!(full["md5"], "mainnet-7-full.g.md5");
}

#[tokio::test]
async fn test_hash_report() {
    let server = TestServer::with_options(TestOptions {
        with_peer: true,
        diverging_peer: false,
    })
    .await;

    let report = |password: &str, name: &str| {
        json!({
            "hash": "abc",
            "password": password,
            "category": "mainnet",
            "type": "full",
            "name": name,
        })
    };

    let (status, body) =
        json_request(&server.router, "POST", "/hash/", Some(report(SECRET, "node-b"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) =
        json_request(&server.router, "POST", "/hash/", Some(report("wrong", "node-b"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        json_request(&server.router, "POST", "/hash/", Some(report(SECRET, "node-z"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let records = server.state.peer_table.snapshot().await;
    let full = records
        .iter()
        .find(|record| record.kind == genesis_core::ArtifactKind::Full)
        .unwrap();
    assert_eq!(full.hash, "abc");
}

#[tokio::test]
async fn test_round_with_agreeing_peer() {
    let server = TestServer::with_options(TestOptions {
        with_peer: true,
        diverging_peer: false,
    })
    .await;
    server.write_unit(0);

    let (status, _) = server.register(0, 7, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    server.settle_rounds().await;

    let rounds = server.state.scheduler.list();
    assert_eq!(rounds.len(), 2);
    assert!(
        rounds
            .iter()
            .all(|round| round.phase == genesis_core::RoundPhase::Attested)
    );

    let (status, _, _) = download(&server.router, "/md5/mainnet-7-none.g.md5", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_round_with_diverging_peer_is_abandoned() {
    let server = TestServer::with_options(TestOptions {
        with_peer: true,
        diverging_peer: true,
    })
    .await;
    server.write_unit(0);

    server.register(0, 7, SECRET).await;
    server.settle_rounds().await;

    for round in server.state.scheduler.list() {
        assert_eq!(round.phase, genesis_core::RoundPhase::Abandoned);
        assert!(round.reason.unwrap().contains("quorum timeout"));
    }

    let (status, _, _) = download(&server.router, "/md5/mainnet-7-full.g.md5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = json_request(&server.router, "GET", "/api/", None).await;
    let full = body["genesis_files"]
        .as_array()
        .unwrap()
        .iter()
        .find(|file| file["name"] == "mainnet-7-full.g")
        .cloned()
        .unwrap();
    assert_eq!(full["md5"], "");
}
