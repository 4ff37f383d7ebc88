//! Shared fixtures for HTTP tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use genesis_core::{
    ArtifactKind, CategoryConfig, Config, ConsensusConfig, DynamicFileConfig, HashReport,
    PeerAck, PeerMirror, PeerRecord, PeerTable, PeerTransport, StaticFileConfig, UnitType,
};
use genesis_server::{ServerState, build_state, create_router};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "pw";

/// Stands in for peer mirrors that hash the same bytes and report back.
#[derive(Default)]
pub struct MirroringPeers {
    table: OnceLock<Arc<PeerTable>>,
    diverge: bool,
}

#[async_trait]
impl PeerTransport for MirroringPeers {
    async fn send_report(&self, peer: &PeerRecord, report: &HashReport) -> genesis_core::Result<PeerAck> {
        let Some(table) = self.table.get() else {
            return Ok(PeerAck::Unknown);
        };
        let hash = if self.diverge {
            "0000".to_string()
        } else {
            report.hash.clone()
        };
        table
            .record_report(&report.category, report.kind, &peer.peer, &hash)
            .await;
        Ok(PeerAck::Accepted)
    }
}

pub struct TestServer {
    pub temp_dir: TempDir,
    pub state: Arc<ServerState>,
    pub router: Router,
}

pub struct TestOptions {
    pub with_peer: bool,
    pub diverging_peer: bool,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_options(TestOptions {
            with_peer: false,
            diverging_peer: false,
        })
        .await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config(temp_dir.path());
        if options.with_peer {
            config.categories[0].peers.push(PeerMirror {
                name: "node-b".to_string(),
                url: "http://node-b.invalid".to_string(),
            });
        }
        config.consensus.round_timeout_secs = 1;
        config.consensus.poll_interval_secs = 1;

        std::fs::create_dir_all(&config.static_files_path).expect("static dir");
        std::fs::write(config.static_files_path.join("legacy.g"), b"legacy genesis").expect("static file");

        let transport = Arc::new(MirroringPeers {
            table: OnceLock::new(),
            diverge: options.diverging_peer,
        });
        let state = build_state(config, transport.clone()).await.expect("state");
        let _ = transport.table.set(state.peer_table.clone());
        let router = create_router(state.clone());

        Self {
            temp_dir,
            state,
            router,
        }
    }

    pub fn units_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("units")
    }

    /// Write unit `index` with distinguishable content for every unit type.
    pub fn write_unit(&self, index: u64) -> Vec<u8> {
        let mut written = Vec::new();
        for unit_type in UnitType::ALL {
            let path = unit_type.unit_path(&self.units_path(), index);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("unit dir");
            let content =
                format!("{}-{}:{};", unit_type.file_prefix(), index, index).into_bytes();
            std::fs::write(&path, &content).expect("unit file");
            written.extend(content);
        }
        written
    }

    /// Wait for every round the scheduler knows about to finish.
    pub async fn settle_rounds(&self) {
        for status in self.state.scheduler.list() {
            let id = status.id.parse().expect("round id");
            self.state.scheduler.wait(id).await.expect("round finished");
        }
    }

    pub async fn register(&self, index: u64, epoch: u64, secret: &str) -> (StatusCode, Value) {
        json_request(
            &self.router,
            "POST",
            "/new/",
            Some(serde_json::json!({
                "index": index,
                "epoch": epoch,
                "category": "mainnet",
                "pw": secret,
            })),
        )
        .await
    }
}

pub fn test_config(root: &Path) -> Config {
    Config {
        server_name: "node-a".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        db_path: root.join("db.json"),
        backup_db_path: root.join("db.backup.json"),
        attestations_path: root.join("md5"),
        static_files_path: root.join("static"),
        buffer_size: 4,
        shared_secret: SECRET.to_string(),
        max_concurrent_transfers: 8,
        consensus: ConsensusConfig::default(),
        categories: vec![CategoryConfig {
            name: "mainnet".to_string(),
            description: "Main network".to_string(),
            units_path: root.join("units"),
            peers: Vec::new(),
            dynamic_files: vec![
                DynamicFileConfig {
                    kind: ArtifactKind::Full,
                    fullsync: true,
                    snapsync: false,
                    block_history: "full".to_string(),
                    evm_history: "full".to_string(),
                },
                DynamicFileConfig {
                    kind: ArtifactKind::Minimal,
                    fullsync: false,
                    snapsync: true,
                    block_history: "full".to_string(),
                    evm_history: "none".to_string(),
                },
            ],
            static_files: vec![StaticFileConfig {
                name: "legacy.g".to_string(),
                md5: String::new(),
                epoch: 0,
                block: 0,
                fullsync: true,
                snapsync: false,
                block_history: String::new(),
                evm_history: String::new(),
                file_size: 14,
            }],
        }],
    }
}

pub async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// POST a raw body, for payloads `json_request` cannot express.
pub async fn raw_request(
    router: &Router,
    uri: &str,
    content_type: Option<&str>,
    body: &'static str,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("Content-Type", content_type);
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap_or(Value::Null))
}

/// GET `uri`, optionally with a `Range` header. Returns status, headers and raw body.
pub async fn download(
    router: &Router,
    uri: &str,
    range: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header("Range", range);
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}
