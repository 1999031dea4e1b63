// =============================================================================
// STALL ALERT SERVICE - Library Root
// =============================================================================
// Realtime classification and theft-alert deduplication for sensor-backed
// restroom dispensers, plus a retention-bounded alert log.
//
// DATA FLOW:
//
//   stream source --batches--> StallMonitor --notifications--> alert intake
//                               |  classifier                    |
//                               |  deduplicator                  v
//                               v                          AlertPanel --> AlertLogStore
//                           StallBoard                      (resolve)      (created/resolved)
//
// The HTTP layer (handlers.rs) is the boundary both ends talk to.
// =============================================================================

pub mod backend;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod panel;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::backend::AnyBackend;
use crate::monitor::{SnapshotBatch, StallBoard};
use crate::panel::AlertPanel;
use crate::store::AlertLogStore;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared by every request handler. The classification loop itself is NOT in
// here: handlers only reach it through the ingest channel and read its
// output through the board.
pub struct AppState {
    /// Producer side of the snapshot stream
    pub ingest: mpsc::Sender<SnapshotBatch>,

    /// Classified stalls and stream health
    pub board: StallBoard,

    pub panel: Arc<AlertPanel<AnyBackend>>,

    pub alert_log: Arc<AlertLogStore<AnyBackend>>,

    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Routes of the service
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health & Readiness -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Stream boundary -----
        .route("/api/v1/stalls", get(handlers::list_stalls))
        .route("/api/v1/stalls/snapshots", post(handlers::ingest_snapshots))
        .route("/api/v1/stalls/stream-error", post(handlers::report_stream_error))
        // ----- Alert panel -----
        .route("/api/v1/alerts", get(handlers::list_alerts))
        .route("/api/v1/alerts/:id/resolve", post(handlers::resolve_alert))
        // ----- Alert log -----
        .route(
            "/api/v1/alert-log",
            get(handlers::alert_log).delete(handlers::clear_alert_log),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
