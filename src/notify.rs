// =============================================================================
// THEFT NOTIFICATIONS
// =============================================================================
// A fire signal from the deduplicator becomes one TheftNotification sent over
// a bounded channel. A separate task consumes the channel (see intake.rs),
// so operator-facing work never runs inside the classification loop and two
// notifications can never interleave.
//
// BACKPRESSURE:
// When the queue is full, `notify` waits for room instead of dropping the
// notification. The loop slows down; no fire is lost.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::StallSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TheftNotification {
    pub stall_path: String,
    pub location_id: String,
    pub stall_id: String,
    pub remaining_percentage: u8,
    pub detected_at: DateTime<Utc>,
}

impl TheftNotification {
    pub fn from_snapshot(snapshot: &StallSnapshot) -> Self {
        Self {
            stall_path: snapshot.stall_path.clone(),
            location_id: snapshot.location_id.clone(),
            stall_id: snapshot.stall_id.clone(),
            remaining_percentage: snapshot.remaining_percentage.value(),
            detected_at: Utc::now(),
        }
    }

    /// Operator-facing text, e.g. "Theft detected at [1F-A-male / stall-01]"
    pub fn message(&self) -> String {
        format!("Theft detected at [{} / {}]", self.location_id, self.stall_id)
    }
}

/// Sending half of the notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<TheftNotification>,
}

/// Create a notification channel holding at most `capacity` pending
/// notifications
pub fn notification_channel(capacity: usize) -> (Notifier, mpsc::Receiver<TheftNotification>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Notifier { tx }, rx)
}

impl Notifier {
    /// Queue a notification. Returns false when nobody is listening any more.
    pub async fn notify(&self, notification: TheftNotification) -> bool {
        match self.tx.send(notification).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(lost)) => {
                warn!(
                    stall_path = %lost.stall_path,
                    "Notification consumer is gone; theft notification not delivered"
                );
                false
            }
        }
    }
}
