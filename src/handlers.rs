// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP handlers: the boundary between the engine and its collaborators.
//
// WHO CALLS WHAT:
// - the upstream stream source pushes snapshot batches (and, when its own
//   subscription breaks, a stream error)
// - the presentation layer reads the stall board, the alert panel and the
//   alert log, and resolves alerts
// - orchestrators call /health, /ready and /metrics
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::LogBackend;
use crate::error::{AppError, AppResult, StreamError};
use crate::metrics;
use crate::models::*;
use crate::panel::AlertFilter;
use crate::store::{query_by_facet, FacetCounts, LogFacet};
use crate::AppState;

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "stall-alert-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: the alert log medium is reachable and the snapshot
/// stream is still live
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let alert_log = state.alert_log.backend().health_check().await;
    let stream = state.board.health().await.live;

    let ready = alert_log && stream;
    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { alert_log, stream },
    };

    if ready {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// STREAM ENDPOINTS
// =============================================================================

// -----------------------------------------------------------------------------
// INGEST SNAPSHOTS
// -----------------------------------------------------------------------------
/// Push one batch of stall snapshots into the stream
///
/// POST /api/v1/stalls/snapshots
///
/// # Request Body
/// ```json
/// {
///   "snapshots": [
///     { "location_id": "1F-A-male", "stall_id": "stall-01",
///       "remaining_percentage": 15, "is_stolen": true }
///   ]
/// }
/// ```
///
/// # Response
/// - 200 OK: batch queued for classification
/// - 422 Unprocessable Entity: a snapshot failed validation (nothing queued)
/// - 503 Service Unavailable: the stream has halted
pub async fn ingest_snapshots(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> AppResult<Json<IngestResponse>> {
    let start = Instant::now();

    let result = queue_batch(&state, request).await;
    record_outcome(
        "POST",
        "/api/v1/stalls/snapshots",
        StatusCode::OK,
        &result,
        start,
    );

    let accepted = result?;
    tracing::debug!(accepted, "Snapshot batch queued");
    Ok(Json(IngestResponse { accepted }))
}

async fn queue_batch(state: &AppState, request: IngestRequest) -> AppResult<usize> {
    let snapshots = request
        .snapshots
        .into_iter()
        .map(StallSnapshot::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let accepted = snapshots.len();

    if state.ingest.send(Ok(snapshots)).await.is_err() {
        return Err(halted(state).await);
    }
    Ok(accepted)
}

// -----------------------------------------------------------------------------
// REPORT STREAM ERROR
// -----------------------------------------------------------------------------
/// The upstream source reports that its subscription failed. Terminal: the
/// monitor stops and the board shows the diagnostic.
///
/// POST /api/v1/stalls/stream-error
pub async fn report_stream_error(
    State(state): State<Arc<AppState>>,
    Json(report): Json<StreamErrorReport>,
) -> AppResult<StatusCode> {
    let start = Instant::now();

    tracing::warn!(message = %report.message, "Upstream reported a subscription failure");

    let result = match state
        .ingest
        .send(Err(StreamError::Subscription(report.message)))
        .await
    {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(_) => Err(halted(&state).await),
    };

    record_outcome(
        "POST",
        "/api/v1/stalls/stream-error",
        StatusCode::ACCEPTED,
        &result,
        start,
    );
    result
}

/// Count the request under the status it is about to answer with
fn record_outcome<T>(
    method: &str,
    endpoint: &str,
    success: StatusCode,
    result: &AppResult<T>,
    start: Instant,
) {
    let status = match result {
        Ok(_) => success,
        Err(err) => err.status_code(),
    };
    metrics::record_http_request(
        method,
        endpoint,
        status.as_u16(),
        start.elapsed().as_secs_f64(),
    );
}

async fn halted(state: &AppState) -> AppError {
    let reason = state
        .board
        .health()
        .await
        .error
        .unwrap_or_else(|| "subscription closed".to_string());
    AppError::StreamHalted(reason)
}

// -----------------------------------------------------------------------------
// STALL BOARD
// -----------------------------------------------------------------------------
/// Latest classified state of every stall, plus stream health
///
/// GET /api/v1/stalls
pub async fn list_stalls(State(state): State<Arc<AppState>>) -> Json<StallBoardResponse> {
    let start = Instant::now();

    let response = StallBoardResponse {
        stalls: state.board.stalls().await,
        stream: state.board.health().await,
    };

    metrics::record_http_request("GET", "/api/v1/stalls", 200, start.elapsed().as_secs_f64());
    Json(response)
}

// =============================================================================
// ALERT PANEL ENDPOINTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AlertListParams {
    #[serde(default)]
    pub status: AlertFilter,
}

/// GET /api/v1/alerts
/// GET /api/v1/alerts?status=active
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertListParams>,
) -> Json<AlertListResponse> {
    let start = Instant::now();

    let response = AlertListResponse {
        alerts: state.panel.alerts(params.status).await,
        counts: state.panel.counts().await,
    };

    metrics::record_http_request("GET", "/api/v1/alerts", 200, start.elapsed().as_secs_f64());
    Json(response)
}

/// Resolve one alert
///
/// POST /api/v1/alerts/:id/resolve
///
/// # Response
/// - 200 OK: the alert after resolving
/// - 404 Not Found: unknown id
/// - 409 Conflict: the alert was already resolved
pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ActiveAlert>> {
    let start = Instant::now();

    let result = state.panel.resolve(&id).await.map_err(AppError::from);
    record_outcome(
        "POST",
        "/api/v1/alerts/:id/resolve",
        StatusCode::OK,
        &result,
        start,
    );

    Ok(Json(result?))
}

// =============================================================================
// ALERT LOG ENDPOINTS
// =============================================================================

/// The last 30 days of alert history, newest first, optionally narrowed by
/// facet. Counts always cover the whole log.
///
/// GET /api/v1/alert-log
/// GET /api/v1/alert-log?type=theft&action=resolved
pub async fn alert_log(
    State(state): State<Arc<AppState>>,
    Query(facet): Query<LogFacet>,
) -> Json<AlertLogResponse> {
    let start = Instant::now();

    let entries = state.alert_log.load().await;
    let counts = FacetCounts::from_entries(&entries);
    let entries = query_by_facet(&entries, &facet).into_iter().cloned().collect();

    metrics::record_http_request("GET", "/api/v1/alert-log", 200, start.elapsed().as_secs_f64());
    Json(AlertLogResponse { entries, counts })
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    #[serde(default)]
    pub confirm: bool,
}

/// Delete the whole alert log. Requires `?confirm=true`.
///
/// DELETE /api/v1/alert-log?confirm=true
pub async fn clear_alert_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClearParams>,
) -> AppResult<StatusCode> {
    let start = Instant::now();

    let result = if params.confirm {
        tracing::warn!("Clearing the alert log on operator request");
        state.alert_log.clear().await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::BadRequest(
            "clearing the alert log is irreversible; repeat with ?confirm=true".to_string(),
        ))
    };

    record_outcome(
        "DELETE",
        "/api/v1/alert-log",
        StatusCode::NO_CONTENT,
        &result,
        start,
    );
    result
}
