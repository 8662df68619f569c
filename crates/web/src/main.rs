mod metrics;
mod models;

use anyhow::Result;
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::config::AggregationConfig;
use common::scheduler;
use common::snapshot::{LedgerSnapshot, SharedSnapshot};
use common::source::LedgerSource;
use common::types::RiskCategory;
use metrics_exporter_prometheus::PrometheusHandle;
use models::{
    AddressList, AddressQuery, AddressRow, HealthResponse, MessageResponse, StatusResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Shared application state available to all handlers.
pub struct AppState {
    pub snapshot: Arc<SharedSnapshot>,
    pub source_location: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// `None` disables `/metrics`.
    pub prometheus: Option<PrometheusHandle>,
}

type ApiError = (StatusCode, Json<MessageResponse>);

fn not_found(what: &str, key: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            message: format!("{what} not found: {key}"),
        }),
    )
}

// --- Handlers ---

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
    })
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = &state.prometheus else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.run_upkeep();
    handle.render().into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snap = state.snapshot.current().await;
    Json(StatusResponse {
        load: snap.status.clone(),
        source: state.source_location.clone(),
        content_hash: snap.content_hash.clone(),
        built_at: snap.built_at,
        records: snap.records().len(),
        flagged_rows: snap.ledger.flagged_rows(),
        addresses: snap.book.len(),
        last_refresh: state.snapshot.last_outcome().await,
    })
}

async fn summary(State(state): State<Arc<AppState>>) -> Response {
    let snap = state.snapshot.current().await;
    Json(&snap.summary).into_response()
}

async fn list_addresses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<AddressList>, ApiError> {
    let risk = match query.risk.as_deref() {
        None => None,
        Some(raw) => Some(RiskCategory::from_str_loose(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse {
                    message: format!("invalid risk: {raw} (expected low, medium or high)"),
                }),
            )
        })?),
    };

    let snap = state.snapshot.current().await;
    let matching: Vec<_> = snap
        .book
        .by_activity()
        .into_iter()
        .filter(|p| match risk {
            Some(c) => p.risk_category == c,
            None => true,
        })
        .collect();
    let total = matching.len();
    let addresses = matching
        .into_iter()
        .take(query.limit.unwrap_or(usize::MAX))
        .map(AddressRow::from)
        .collect();

    Ok(Json(AddressList {
        primary: snap.book.primary().map(|p| p.address.clone()),
        total,
        addresses,
    }))
}

async fn get_address(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let snap = state.snapshot.current().await;
    let report = snap
        .address(&address)
        .ok_or_else(|| not_found("address", &address))?;
    Ok(Json(report).into_response())
}

async fn top_risk(State(state): State<Arc<AppState>>) -> Response {
    let snap = state.snapshot.current().await;
    Json(snap.top_risk()).into_response()
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let snap = state.snapshot.current().await;
    let detail = snap
        .transaction(&id)
        .ok_or_else(|| not_found("transaction", &id))?;
    Ok(Json(detail).into_response())
}

async fn activity(State(state): State<Arc<AppState>>) -> Response {
    let snap = state.snapshot.current().await;
    Json(snap.recent_activity()).into_response()
}

async fn correlation(State(state): State<Arc<AppState>>) -> Response {
    let snap = state.snapshot.current().await;
    Json(&snap.correlation).into_response()
}

/// Count requests per matched route and status class.
async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let response = next.run(req).await;
    let class = match response.status().as_u16() {
        200..=299 => "2xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    ::metrics::counter!("web_requests_total", "route" => route, "status" => class).increment(1);
    response
}

// --- Router ---

pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/status", get(status))
        .route("/api/summary", get(summary))
        .route("/api/addresses", get(list_addresses))
        .route("/api/addresses/{address}", get(get_address))
        .route("/api/transactions/top-risk", get(top_risk))
        .route("/api/transactions/{id}", get(get_transaction))
        .route("/api/activity", get(activity))
        .route("/api/correlation", get(correlation))
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reload the ledger every `interval`; the first reload happens one interval after startup.
fn spawn_refresh(
    shared: Arc<SharedSnapshot>,
    source: LedgerSource,
    config: AggregationConfig,
    interval: Duration,
) {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(8);
    scheduler::start(vec![scheduler::JobSpec {
        name: "ledger_refresh".to_string(),
        interval,
        tick: tx,
    }]);
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let outcome = shared
                .refresh(&source, &config)
                .instrument(tracing::info_span!("job_run", job = "ledger_refresh"))
                .await;
            tracing::info!(outcome = outcome.as_str(), "ledger refresh");
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("web", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let prometheus = metrics::install()?;

    let source = LedgerSource::from_config(&config.source)?;
    let initial = LedgerSnapshot::build(source.load().await, &config.aggregation);
    let shared = Arc::new(SharedSnapshot::new(initial));

    let state = Arc::new(AppState {
        snapshot: shared.clone(),
        source_location: source.location(),
        started_at: chrono::Utc::now(),
        prometheus: Some(prometheus),
    });

    spawn_refresh(
        shared,
        source,
        config.aggregation,
        Duration::from_secs(config.refresh.interval_secs),
    );

    let web_port = config.web.as_ref().map_or(8080, |w| w.port);
    let web_host = config
        .web
        .as_ref()
        .map_or("0.0.0.0".to_string(), |w| w.host.clone());

    let app = create_router_with_state(state);
    let addr: SocketAddr = format!("{web_host}:{web_port}").parse()?;
    tracing::info!(%addr, "ledger API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
