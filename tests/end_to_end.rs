// =============================================================================
// END-TO-END SCENARIOS
// =============================================================================
// Drives the engine the way the service does: batches through the stream
// channel, notifications through the intake task, resolution through the
// panel, history through the alert log.
// =============================================================================

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use stall_alert_service::backend::MemoryBackend;
use stall_alert_service::dedup::{DedupEffect, Deduplicator};
use stall_alert_service::intake::run_alert_intake;
use stall_alert_service::models::{
    AlertDetails, AlertSeverity, AlertType, ClassifiedState, LogAction, RemainingPercentage,
    StallSnapshot,
};
use stall_alert_service::monitor::{StallBoard, StallMonitor};
use stall_alert_service::notify::notification_channel;
use stall_alert_service::panel::{AlertFilter, AlertPanel};
use stall_alert_service::store::AlertLogStore;

fn reading(remaining: i64, is_stolen: bool) -> StallSnapshot {
    StallSnapshot::from_path(
        "loc-A/stalls/s1",
        RemainingPercentage::new(remaining).unwrap(),
        is_stolen,
        None,
    )
    .unwrap()
}

#[test]
fn stall_walks_through_normal_low_stolen_and_back() {
    let mut dedup = Deduplicator::new();
    let path = "loc-A/stalls/s1";

    let d = dedup.on_snapshot(&reading(50, false));
    assert_eq!(d.state, ClassifiedState::Normal);
    assert!(!d.should_fire_theft_alert);

    let d = dedup.on_snapshot(&reading(15, false));
    assert_eq!(d.state, ClassifiedState::Low);
    assert!(!d.should_fire_theft_alert);

    let d = dedup.on_snapshot(&reading(15, true));
    assert_eq!(d.state, ClassifiedState::Stolen);
    assert!(d.should_fire_theft_alert);
    assert_eq!(d.effect, DedupEffect::Insert);
    assert!(dedup.is_tracking(path));

    let d = dedup.on_snapshot(&reading(15, true));
    assert_eq!(d.state, ClassifiedState::Stolen);
    assert!(!d.should_fire_theft_alert);

    let d = dedup.on_snapshot(&reading(15, false));
    assert_eq!(d.state, ClassifiedState::Low);
    assert_eq!(d.effect, DedupEffect::Remove);
    assert!(!dedup.is_tracking(path));
}

#[tokio::test]
async fn created_and_resolved_entries_load_newest_first() {
    let store = AlertLogStore::new(MemoryBackend::new());
    let alert = AlertDetails {
        id: "alert-1".into(),
        alert_type: AlertType::Theft,
        severity: AlertSeverity::Critical,
        title: "Suspected theft".into(),
        description: "Abnormal consumption in the last 30 minutes".into(),
        location: "2F center / stall-2".into(),
    };
    let t0 = Utc.with_ymd_and_hms(2025, 10, 30, 10, 30, 0).unwrap();

    store.append_at(&alert, LogAction::Created, t0).await;
    store
        .append_at(&alert, LogAction::Resolved, t0 + Duration::milliseconds(1000))
        .await;

    for later in [Duration::zero(), Duration::days(10), Duration::days(30) - Duration::seconds(2)] {
        let loaded = store.load_at(t0 + later).await;
        let actions: Vec<LogAction> = loaded.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![LogAction::Resolved, LogAction::Created]);
    }

    assert!(store.load_at(t0 + Duration::days(31)).await.is_empty());
}

#[tokio::test]
async fn theft_run_raises_one_alert_that_an_operator_resolves() {
    let store = Arc::new(AlertLogStore::new(MemoryBackend::new()));
    let panel = Arc::new(AlertPanel::new(store.clone()));
    let board = StallBoard::new();

    let (notifier, notifications) = notification_channel(8);
    let (ingest, source) = mpsc::channel(8);
    let subscription = StallMonitor::new(notifier, board.clone()).subscribe(source);
    let intake = tokio::spawn(run_alert_intake(notifications, panel.clone(), store.clone()));

    ingest
        .send(Ok(vec![reading(50, false), reading(15, true), reading(15, true)]))
        .await
        .unwrap();
    ingest.send(Ok(vec![reading(15, true)])).await.unwrap();
    drop(ingest);

    // Source closed: the loop stops on its own after draining both batches
    let monitor = loop {
        if subscription.is_finished() {
            break subscription.unsubscribe().await.unwrap();
        }
        tokio::task::yield_now().await;
    };
    assert!(monitor.deduplicator().is_tracking("loc-A/stalls/s1"));

    // Dropping the monitor closes the notification channel
    drop(monitor);
    intake.await.unwrap();

    let active = panel.alerts(AlertFilter::Active).await;
    assert_eq!(active.len(), 1, "one stolen run must raise exactly one alert");
    assert_eq!(active[0].details.location, "loc-A / s1");

    let stalls = board.stalls().await;
    assert_eq!(stalls.len(), 1);
    assert_eq!(stalls[0].state, ClassifiedState::Stolen);

    panel.resolve(active[0].id()).await.unwrap();
    assert!(panel.resolve(active[0].id()).await.is_err());

    let log = store.load().await;
    let actions: Vec<LogAction> = log.iter().map(|e| e.action).collect();
    assert_eq!(actions.len(), 2);
    assert!(actions.contains(&LogAction::Created));
    assert!(actions.contains(&LogAction::Resolved));
    assert!(log.iter().all(|e| e.alert.id == active[0].details.id));
    assert!(log[0].timestamp >= log[1].timestamp);
}
