// =============================================================================
// ALERT INTAKE
// =============================================================================
// Consumer side of the notification channel. For every theft notification it
// 1. tells the operator (a warning in the service log),
// 2. records a `created` entry in the alert log,
// 3. puts an unresolved theft alert on the panel.
//
// Runs as its own task, one notification at a time, so operator-facing work
// never blocks the classification loop and never interleaves.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::LogBackend;
use crate::models::{ActiveAlert, AlertDetails, AlertSeverity, AlertType, LogAction};
use crate::notify::TheftNotification;
use crate::panel::AlertPanel;
use crate::store::AlertLogStore;

/// Build the panel alert for a theft notification
pub fn theft_alert(notification: &TheftNotification) -> ActiveAlert {
    ActiveAlert::new(AlertDetails {
        id: format!("alert-{}", Uuid::new_v4()),
        alert_type: AlertType::Theft,
        severity: AlertSeverity::Critical,
        title: "Suspected theft".to_string(),
        description: format!(
            "Theft flag raised by the dispenser with {}% remaining",
            notification.remaining_percentage
        ),
        location: format!("{} / {}", notification.location_id, notification.stall_id),
    })
}

/// Drain `notifications` until every sender is gone
pub async fn run_alert_intake<B: LogBackend>(
    mut notifications: mpsc::Receiver<TheftNotification>,
    panel: Arc<AlertPanel<B>>,
    store: Arc<AlertLogStore<B>>,
) {
    while let Some(notification) = notifications.recv().await {
        warn!(
            location_id = %notification.location_id,
            stall_id = %notification.stall_id,
            detected_at = %notification.detected_at,
            "{}",
            notification.message()
        );

        let alert = theft_alert(&notification);
        store.append(&alert.details, LogAction::Created).await;

        if let Err(err) = panel.raise(alert).await {
            warn!(error = %err, "Theft alert not added to the panel");
        }
    }

    info!("Notification channel closed; alert intake stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::{RemainingPercentage, StallSnapshot};
    use crate::notify::notification_channel;
    use crate::panel::AlertFilter;

    #[tokio::test]
    async fn each_notification_creates_one_logged_alert() {
        let store = Arc::new(AlertLogStore::new(MemoryBackend::new()));
        let panel = Arc::new(AlertPanel::new(store.clone()));
        let (notifier, rx) = notification_channel(4);

        let snapshot = StallSnapshot::new(
            "2F-center",
            "stall-02",
            RemainingPercentage::new(35).unwrap(),
            true,
            None,
        );
        notifier.notify(TheftNotification::from_snapshot(&snapshot)).await;
        drop(notifier);

        run_alert_intake(rx, panel.clone(), store.clone()).await;

        let alerts = panel.alerts(AlertFilter::Active).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].details.location, "2F-center / stall-02");
        assert_eq!(alerts[0].details.alert_type, AlertType::Theft);

        let log = store.load().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, LogAction::Created);
        assert_eq!(log[0].alert.id, alerts[0].details.id);
    }
}
