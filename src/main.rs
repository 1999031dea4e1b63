// =============================================================================
// STALL ALERT SERVICE - Main Entry Point
// =============================================================================
// WHAT THIS SERVICE DOES:
// - Accepts per-stall snapshots pushed by the upstream stream source
// - Classifies every snapshot (stolen / low / normal)
// - Fires exactly one theft alert per contiguous stolen run of a stall
// - Keeps a 30-day log of alert creations and resolutions
// - Exposes the classified board, the alert panel and the log over HTTP
// - Exposes Prometheus metrics for observability
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stall_alert_service::backend::{AnyBackend, LogBackend};
use stall_alert_service::config::Config;
use stall_alert_service::intake::run_alert_intake;
use stall_alert_service::metrics::setup_metrics;
use stall_alert_service::monitor::{StallBoard, StallMonitor};
use stall_alert_service::notify::notification_channel;
use stall_alert_service::panel::AlertPanel;
use stall_alert_service::store::AlertLogStore;
use stall_alert_service::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Environment and logging
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok();

    // RUST_LOG controls log levels, e.g. RUST_LOG=info,stall_alert_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stall_alert_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Stall Alert Service...");

    // -------------------------------------------------------------------------
    // STEP 2: Configuration and metrics
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(port = config.port, board_mode = ?config.board_mode, "Configuration loaded");

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 3: Alert log and panel
    // -------------------------------------------------------------------------
    let backend = AnyBackend::connect(&config.alert_log).await?;
    info!(backend = backend.kind(), "Alert log backend ready");

    let alert_log = Arc::new(AlertLogStore::new(backend));
    let panel = Arc::new(AlertPanel::new(alert_log.clone()));

    // -------------------------------------------------------------------------
    // STEP 4: Classification loop and notification consumer
    // -------------------------------------------------------------------------
    // The monitor task owns the dedup state. It talks to the rest of the
    // service only through channels and the board.
    let board = StallBoard::with_mode(config.board_mode);
    let (notifier, notifications) = notification_channel(config.notification_queue_capacity);
    let (ingest, source) = mpsc::channel(config.stream_buffer_capacity);

    let subscription = StallMonitor::new(notifier, board.clone()).subscribe(source);
    let intake = tokio::spawn(run_alert_intake(
        notifications,
        panel.clone(),
        alert_log.clone(),
    ));

    // -------------------------------------------------------------------------
    // STEP 5: HTTP server
    // -------------------------------------------------------------------------
    let state = Arc::new(AppState {
        ingest,
        board,
        panel,
        alert_log,
        metrics_handle,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Stall Alert Service is listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // -------------------------------------------------------------------------
    // STEP 6: Teardown
    // -------------------------------------------------------------------------
    // Unsubscribing stops the loop; dropping the monitor drops the last
    // notifier, which lets the intake task drain and exit.
    if let Some(monitor) = subscription.unsubscribe().await {
        info!(
            open_theft_conditions = monitor.deduplicator().len(),
            "Snapshot subscription released"
        );
    }
    intake.await?;

    info!("Stall Alert Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
