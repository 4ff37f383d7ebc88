use crate::error::{ApiError, ApiResponse, ApiResult};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use genesis_core::{
    ArtifactSource, AttestationStore, ByteRange, Catalog, Config, GenesisError, HashReport,
    HttpPeerTransport, LedgerFiles, PeerTable, PeerTransport, RangeStreamer,
    ReadArtifactOperation, ReadArtifactOperationOutcome, ReadArtifactOperationRequest,
    RegisterUnitOperation, RegisterUnitOperationRequest, ReportHashOperation,
    ReportHashOperationOutcome, Result, RoundScheduler, RoundStatus, UnitLedger,
    VerifyArtifactOperation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub config: Arc<Config>,
    pub ledger: Arc<UnitLedger>,
    pub catalog: Arc<Catalog>,
    pub peer_table: Arc<PeerTable>,
    pub scheduler: Arc<RoundScheduler>,
    pub register_unit: RegisterUnitOperation,
    pub report_hash: ReportHashOperation,
    pub read_artifact: ReadArtifactOperation,
    pub transfers: Arc<Semaphore>,
}

#[derive(Debug, Deserialize)]
struct RegisterUnitBody {
    index: u64,
    epoch: u64,
    category: String,
    #[serde(rename = "pw")]
    shared_secret: String,
}

#[derive(Debug, Serialize)]
struct RegisterUnitResponse {
    category: String,
    epoch: i64,
    index: i64,
    rounds: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    server_name: String,
    categories: usize,
    live_rounds: usize,
}

/// Wire everything the HTTP layer needs around an already loaded config.
pub async fn build_state(config: Config, transport: Arc<dyn PeerTransport>) -> Result<Arc<ServerState>> {
    let config = Arc::new(config);

    let category_names: Vec<String> = config.categories.iter().map(|c| c.name.clone()).collect();
    let ledger = Arc::new(
        UnitLedger::load(
            LedgerFiles {
                path: config.db_path.clone(),
                backup_path: config.backup_db_path.clone(),
            },
            &category_names,
        )
        .await?,
    );

    let attestations =
        AttestationStore::new(config.attestations_path.clone(), config.consensus.digest)?;
    let catalog = Arc::new(Catalog::new(config.clone(), ledger.clone(), attestations.clone()));
    let peer_table = Arc::new(PeerTable::from_config(&config));

    let verify = VerifyArtifactOperation::new(
        config.clone(),
        peer_table.clone(),
        transport,
        attestations,
        catalog.clone(),
    );
    let scheduler = Arc::new(RoundScheduler::new(
        verify,
        config.consensus.max_concurrent_rounds,
    ));

    let register_unit = RegisterUnitOperation::new(
        config.clone(),
        ledger.clone(),
        catalog.clone(),
        scheduler.clone(),
    );
    let report_hash = ReportHashOperation::new(config.shared_secret.clone(), peer_table.clone());
    let read_artifact = ReadArtifactOperation::new(
        config.clone(),
        ledger.clone(),
        RangeStreamer::new(config.buffer_size),
    );
    let transfers = Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1)));

    catalog.refresh().await;

    Ok(Arc::new(ServerState {
        config,
        ledger,
        catalog,
        peer_table,
        scheduler,
        register_unit,
        report_hash,
        read_artifact,
        transfers,
    }))
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api", get(catalog_handler))
        .route("/api/", get(catalog_handler))
        .route("/api/rounds", get(rounds_handler))
        .route("/new", post(register_unit_handler))
        .route("/new/", post(register_unit_handler))
        .route("/hash", post(report_hash_handler))
        .route("/hash/", post(report_hash_handler))
        .route("/dynamic/*file", get(dynamic_handler))
        .route("/static/*file", get(static_handler))
        .route("/md5/*file", get(attestation_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<()> {
    let transport = Arc::new(HttpPeerTransport::new(
        config.consensus.peer_request_timeout(),
    )?);
    let bind_addr = config.bind_addr.clone();

    let state = build_state(config, transport).await?;
    let scheduler = state.scheduler.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        server_name: state.config.server_name.clone(),
        categories: state.config.categories.len(),
        live_rounds: state.scheduler.live_count(),
    })
}

async fn catalog_handler(State(state): State<Arc<ServerState>>) -> Response {
    let snapshot = state.catalog.snapshot().await;
    Json(snapshot.as_ref()).into_response()
}

async fn rounds_handler(
    State(state): State<Arc<ServerState>>,
) -> Json<ApiResponse<Vec<RoundStatus>>> {
    ApiResponse::ok(state.scheduler.list())
}

async fn register_unit_handler(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<RegisterUnitBody>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<RegisterUnitResponse>>> {
    let Json(body) = payload?;
    let category = body.category.clone();
    let result = state
        .register_unit
        .run(RegisterUnitOperationRequest {
            category: body.category,
            index: body.index,
            epoch: body.epoch,
            shared_secret: body.shared_secret,
        })
        .await?;

    Ok(ApiResponse::ok(RegisterUnitResponse {
        category,
        epoch: result.latest.epoch,
        index: result.latest.index,
        rounds: result.rounds.iter().map(ToString::to_string).collect(),
    }))
}

async fn report_hash_handler(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<HashReport>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<&'static str>>> {
    let Json(report) = payload?;
    let origin = report.origin.clone();
    match state.report_hash.run(report).await? {
        ReportHashOperationOutcome::Recorded => Ok(ApiResponse::ok("recorded")),
        ReportHashOperationOutcome::UnknownPeer => Err(ApiError::NotFound(format!(
            "no peer record for {}",
            origin
        ))),
    }
}

async fn dynamic_handler(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_artifact(&state, ArtifactSource::Dynamic(file), &headers).await
}

async fn static_handler(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_artifact(&state, ArtifactSource::Static(file), &headers).await
}

async fn attestation_handler(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_artifact(&state, ArtifactSource::Attestation(file), &headers).await
}

async fn serve_artifact(
    state: &ServerState,
    source: ArtifactSource,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let range = match headers.get(RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("range header is not valid ASCII".to_string()))?;
            Some(ByteRange::parse_header(value)?)
        }
        None => None,
    };

    let outcome = state
        .read_artifact
        .run(ReadArtifactOperationRequest {
            source: source.clone(),
            range,
        })
        .await?;
    let ReadArtifactOperationOutcome::Found(result) = outcome else {
        return Err(ApiError::NotFound(format!("{:?}", source)));
    };

    let permit = state
        .transfers
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| GenesisError::Internal("transfer limiter closed".to_string()))?;

    let transfer = result.transfer;
    let status = if transfer.range().is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let content_range = transfer.range().map(|range| range.header_value());
    let content_length = transfer.content_length().to_string();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        result.file_name.replace('"', "_")
    );

    tracing::info!(
        "Serving {} ({} of {} bytes)",
        result.file_name,
        content_length,
        transfer.total_size()
    );

    let cancel = CancellationToken::new();
    let receiver = state
        .read_artifact
        .streamer()
        .spawn_body(transfer, cancel.clone(), Some(permit));
    let stream = futures_util::stream::unfold(
        (receiver, cancel.drop_guard()),
        |(mut receiver, guard)| async move {
            let item = receiver.recv().await?;
            Some((item, (receiver, guard)))
        },
    );

    let mut response = (
        status,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, content_length),
            (CONTENT_DISPOSITION, disposition),
            (ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response();

    if let Some(content_range) = content_range {
        let value = HeaderValue::from_str(&content_range)
            .map_err(|error| GenesisError::Internal(error.to_string()))?;
        response.headers_mut().insert(CONTENT_RANGE, value);
    }

    Ok(response)
}
