// =============================================================================
// ALERT LIFECYCLE PANEL
// =============================================================================
// Holds the alerts operators work with and owns the only transition an alert
// has: unresolved -> resolved.
//
// RULES:
// - Alerts are addressed by id, never by position, so updating one alert
//   can never touch another
// - Resolving an already resolved alert is rejected and writes nothing
// - A successful resolve appends exactly one `resolved` entry to the log
// - Resolved alerts stay on the panel; they are filtered, not deleted
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::LogBackend;
use crate::error::PanelError;
use crate::models::{ActiveAlert, AlertSeverity, AlertType, LogAction};
use crate::store::AlertLogStore;

/// Which alerts to list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFilter {
    #[default]
    All,
    Active,
    Resolved,
}

impl AlertFilter {
    fn matches(self, alert: &ActiveAlert) -> bool {
        match self {
            AlertFilter::All => true,
            AlertFilter::Active => !alert.is_resolved,
            AlertFilter::Resolved => alert.is_resolved,
        }
    }
}

/// Counts shown on the alert panel header. Type and severity counts only
/// consider active alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PanelCounts {
    pub active: usize,
    pub resolved: usize,
    pub theft: usize,
    pub malfunction: usize,
    pub critical: usize,
}

pub struct AlertPanel<B> {
    alerts: Mutex<Vec<ActiveAlert>>,
    store: Arc<AlertLogStore<B>>,
}

impl<B: LogBackend> AlertPanel<B> {
    pub fn new(store: Arc<AlertLogStore<B>>) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            store,
        }
    }

    /// Put a newly detected alert on the panel
    pub async fn raise(&self, alert: ActiveAlert) -> Result<(), PanelError> {
        let mut alerts = self.alerts.lock().await;
        if alerts.iter().any(|a| a.id() == alert.id()) {
            return Err(PanelError::Duplicate(alert.id().to_string()));
        }

        info!(
            alert_id = %alert.id(),
            location = %alert.details.location,
            "Alert raised"
        );
        alerts.push(alert);
        Ok(())
    }

    /// Mark the alert with `id` resolved and log the resolution.
    ///
    /// # Returns
    /// * `Ok(ActiveAlert)` - the alert as it is after resolving
    /// * `Err(PanelError::NotFound)` - no alert with that id
    /// * `Err(PanelError::AlreadyResolved)` - nothing changed, nothing logged
    pub async fn resolve(&self, id: &str) -> Result<ActiveAlert, PanelError> {
        let resolved = {
            let mut alerts = self.alerts.lock().await;
            let alert = alerts
                .iter_mut()
                .find(|a| a.id() == id)
                .ok_or_else(|| PanelError::NotFound(id.to_string()))?;

            if alert.is_resolved {
                warn!(alert_id = %id, "Ignoring resolve of an already resolved alert");
                return Err(PanelError::AlreadyResolved(id.to_string()));
            }
            alert.is_resolved = true;
            alert.clone()
        };

        // The flip above is committed before the append, so a concurrent
        // resolve of the same id sees it and is rejected
        self.store.append(&resolved.details, LogAction::Resolved).await;

        info!(alert_id = %id, title = %resolved.details.title, "Alert resolved");
        Ok(resolved)
    }

    pub async fn alerts(&self, filter: AlertFilter) -> Vec<ActiveAlert> {
        let alerts = self.alerts.lock().await;
        alerts.iter().filter(|a| filter.matches(a)).cloned().collect()
    }

    pub async fn counts(&self) -> PanelCounts {
        let alerts = self.alerts.lock().await;
        let active = || alerts.iter().filter(|a| !a.is_resolved);

        PanelCounts {
            active: active().count(),
            resolved: alerts.iter().filter(|a| a.is_resolved).count(),
            theft: active()
                .filter(|a| a.details.alert_type == AlertType::Theft)
                .count(),
            malfunction: active()
                .filter(|a| a.details.alert_type == AlertType::Malfunction)
                .count(),
            critical: active()
                .filter(|a| a.details.severity == AlertSeverity::Critical)
                .count(),
        }
    }
}
