// =============================================================================
// MODELS MODULE
// =============================================================================
// This module defines the data structures used throughout the service:
// - stall snapshots delivered by the stream source
// - the classified state of a stall
// - alerts, as held by the lifecycle panel and as snapshotted into the log
// - API request/response bodies
//
// LEARNING NOTES:
// - Newtypes (a struct wrapping one value) let the compiler enforce ranges
//   once, at construction, instead of checking everywhere
// - Serde attributes (rename_all, rename, default) let the Rust names stay
//   idiomatic while the JSON keeps the names the log already uses
// =============================================================================

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::panel::PanelCounts;
use crate::store::FacetCounts;

/// Collection that groups stalls under their location in a stall path
pub const LOCATIONS_COLLECTION: &str = "toilet_locations";

/// Sub-collection name holding the stalls of one location
pub const STALLS_COLLECTION: &str = "stalls";

// =============================================================================
// REMAINING PERCENTAGE
// =============================================================================
/// Remaining supply reported by a stall, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RemainingPercentage(u8);

impl RemainingPercentage {
    /// Validate a raw reading
    ///
    /// # Returns
    /// * `Ok(RemainingPercentage)` for readings in 0..=100
    /// * `Err(SnapshotError::PercentageOutOfRange)` otherwise
    pub fn new(value: i64) -> Result<Self, SnapshotError> {
        match u8::try_from(value) {
            Ok(v) if v <= 100 => Ok(Self(v)),
            _ => Err(SnapshotError::PercentageOutOfRange(value)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

// =============================================================================
// STALL SNAPSHOT
// =============================================================================
// One point-in-time reading for one stall, as delivered by the stream.
//
// `stall_path` is the deduplication key: it is stable across updates and
// unique per physical stall.
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StallSnapshot {
    /// Fully qualified path, e.g. "toilet_locations/1F-A-male/stalls/stall-01"
    pub stall_path: String,

    /// Containing location (the parent grouping of the stall)
    pub location_id: String,

    /// Stall identity within its location
    pub stall_id: String,

    pub remaining_percentage: RemainingPercentage,

    /// Set by upstream anomaly detection
    pub is_stolen: bool,

    /// `None` means the update time is unknown
    pub last_updated: Option<DateTime<Utc>>,
}

impl StallSnapshot {
    /// Build a snapshot for a stall addressed by location and stall id.
    /// The stall path is derived from both ids.
    pub fn new(
        location_id: impl Into<String>,
        stall_id: impl Into<String>,
        remaining_percentage: RemainingPercentage,
        is_stolen: bool,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        let location_id = location_id.into();
        let stall_id = stall_id.into();
        Self {
            stall_path: stall_path(&location_id, &stall_id),
            location_id,
            stall_id,
            remaining_percentage,
            is_stolen,
            last_updated,
        }
    }

    /// Build a snapshot from an already qualified path such as
    /// "loc-A/stalls/s1". The location is the segment two levels above the
    /// stall, the stall id is the last segment.
    pub fn from_path(
        path: impl Into<String>,
        remaining_percentage: RemainingPercentage,
        is_stolen: bool,
        last_updated: Option<DateTime<Utc>>,
    ) -> Result<Self, SnapshotError> {
        let path = path.into();
        let segments: Vec<&str> = path.split('/').collect();
        let n = segments.len();

        if n < 3 || segments[n - 2] != STALLS_COLLECTION {
            return Err(SnapshotError::MalformedPath(path));
        }
        let (location_id, stall_id) = (segments[n - 3], segments[n - 1]);
        if location_id.is_empty() || stall_id.is_empty() {
            return Err(SnapshotError::MalformedPath(path));
        }

        Ok(Self {
            location_id: location_id.to_string(),
            stall_id: stall_id.to_string(),
            stall_path: path,
            remaining_percentage,
            is_stolen,
            last_updated,
        })
    }
}

/// Fully qualified path for a stall
pub fn stall_path(location_id: &str, stall_id: &str) -> String {
    format!("{LOCATIONS_COLLECTION}/{location_id}/{STALLS_COLLECTION}/{stall_id}")
}

// -----------------------------------------------------------------------------
// INBOUND SNAPSHOT PAYLOAD
// -----------------------------------------------------------------------------
/// One stall item as pushed by the upstream source
///
/// # Example JSON
/// ```json
/// {
///   "location_id": "1F-A-male",
///   "stall_id": "stall-01",
///   "remaining_percentage": 80,
///   "is_stolen": false,
///   "last_updated": "2025-10-30T10:30:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub location_id: String,
    pub stall_id: String,
    pub remaining_percentage: i64,
    pub is_stolen: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl TryFrom<SnapshotPayload> for StallSnapshot {
    type Error = SnapshotError;

    fn try_from(payload: SnapshotPayload) -> Result<Self, Self::Error> {
        if payload.location_id.trim().is_empty() {
            return Err(SnapshotError::MissingIdentity("location_id"));
        }
        if payload.stall_id.trim().is_empty() {
            return Err(SnapshotError::MissingIdentity("stall_id"));
        }
        let remaining = RemainingPercentage::new(payload.remaining_percentage)?;

        Ok(StallSnapshot::new(
            payload.location_id,
            payload.stall_id,
            remaining,
            payload.is_stolen,
            payload.last_updated,
        ))
    }
}

// =============================================================================
// CLASSIFIED STATE
// =============================================================================
/// Severity state of one snapshot. Recomputed per snapshot, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifiedState {
    Stolen,
    Low,
    Normal,
}

impl ClassifiedState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassifiedState::Stolen => "stolen",
            ClassifiedState::Low => "low",
            ClassifiedState::Normal => "normal",
        }
    }
}

/// A snapshot together with the state it classified to
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedStall {
    #[serde(flatten)]
    pub snapshot: StallSnapshot,
    pub state: ClassifiedState,
}

// =============================================================================
// ALERTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    Theft,
    Malfunction,
    LowStock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

// -----------------------------------------------------------------------------
// ALERT DETAILS
// -----------------------------------------------------------------------------
// The descriptive fields of an alert. Log entries hold a copy of this value,
// so editing an alert later never changes a historical entry.
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDetails {
    /// Identity of the alert this snapshot was taken from
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub alert_type: AlertType,

    pub severity: AlertSeverity,

    pub title: String,

    pub description: String,

    /// Human-readable location, e.g. "1F-A-male / stall-01"
    pub location: String,
}

// -----------------------------------------------------------------------------
// ACTIVE ALERT
// -----------------------------------------------------------------------------
/// An alert held by the lifecycle panel. It starts unresolved and is flipped
/// to resolved exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    #[serde(flatten)]
    pub details: AlertDetails,

    pub is_resolved: bool,

    pub raised_at: DateTime<Utc>,
}

impl ActiveAlert {
    pub fn new(details: AlertDetails) -> Self {
        Self {
            details,
            is_resolved: false,
            raised_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.details.id
    }
}

// =============================================================================
// ALERT LOG ENTRY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Created,
    Resolved,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::Resolved => "resolved",
        }
    }
}

/// One immutable record in the alert log
///
/// # Example JSON
/// ```json
/// {
///   "id": "log-1730252400000-3f9a1c2d7",
///   "alert": { "id": "alert-1", "type": "theft", "severity": "critical", ... },
///   "action": "created",
///   "timestamp": 1730252400000,
///   "actionTime": "2024/10/30 10:40:00"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLogEntry {
    pub id: String,

    pub alert: AlertDetails,

    pub action: LogAction,

    /// Epoch milliseconds; the sort key and the retention clock
    pub timestamp: i64,

    /// Display copy of `timestamp`, not authoritative
    pub action_time: String,
}

/// Render an epoch-millisecond timestamp the way the log displays it,
/// e.g. "2025/10/30 9:05:07" in local time.
pub fn format_action_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(local) => local.format("%Y/%-m/%-d %-H:%M:%S").to_string(),
        None => String::new(),
    }
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================

/// Request body for pushing a batch of snapshots into the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub snapshots: Vec<SnapshotPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

/// Request body the upstream source sends when its subscription fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamErrorReport {
    pub message: String,
}

/// Whether the stream is still delivering, and the diagnostic if not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamHealth {
    pub live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StallBoardResponse {
    pub stalls: Vec<ClassifiedStall>,
    pub stream: StreamHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<ActiveAlert>,
    pub counts: PanelCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertLogResponse {
    pub entries: Vec<AlertLogEntry>,
    pub counts: FacetCounts,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub alert_log: bool,
    pub stream: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rejects_out_of_range() {
        assert!(RemainingPercentage::new(0).is_ok());
        assert!(RemainingPercentage::new(100).is_ok());
        assert!(matches!(
            RemainingPercentage::new(101),
            Err(SnapshotError::PercentageOutOfRange(101))
        ));
        assert!(matches!(
            RemainingPercentage::new(-1),
            Err(SnapshotError::PercentageOutOfRange(-1))
        ));
    }

    #[test]
    fn new_snapshot_derives_path() {
        let pct = RemainingPercentage::new(80).unwrap();
        let s = StallSnapshot::new("1F-A-male", "stall-01", pct, false, None);
        assert_eq!(s.stall_path, "toilet_locations/1F-A-male/stalls/stall-01");
    }

    #[test]
    fn from_path_extracts_location_and_stall() {
        let pct = RemainingPercentage::new(50).unwrap();
        let s = StallSnapshot::from_path("loc-A/stalls/s1", pct, false, None).unwrap();
        assert_eq!(s.location_id, "loc-A");
        assert_eq!(s.stall_id, "s1");

        assert!(StallSnapshot::from_path("loc-A/s1", pct, false, None).is_err());
        assert!(StallSnapshot::from_path("loc-A/rooms/s1", pct, false, None).is_err());
    }

    #[test]
    fn payload_conversion_validates() {
        let payload = SnapshotPayload {
            location_id: "1F".into(),
            stall_id: "s1".into(),
            remaining_percentage: 120,
            is_stolen: false,
            last_updated: None,
        };
        assert!(StallSnapshot::try_from(payload.clone()).is_err());

        let ok = SnapshotPayload {
            remaining_percentage: 20,
            ..payload.clone()
        };
        assert_eq!(StallSnapshot::try_from(ok).unwrap().remaining_percentage.value(), 20);

        let blank = SnapshotPayload {
            stall_id: " ".into(),
            remaining_percentage: 20,
            ..payload
        };
        assert!(matches!(
            StallSnapshot::try_from(blank),
            Err(SnapshotError::MissingIdentity("stall_id"))
        ));
    }

    #[test]
    fn log_entry_uses_original_field_names() {
        let json = r#"{
            "id": "log-1-abc",
            "alert": {
                "id": "alert-1",
                "type": "low-stock",
                "severity": "warning",
                "title": "t",
                "description": "d",
                "location": "l",
                "timestamp": "5 min ago",
                "isResolved": false
            },
            "action": "resolved",
            "timestamp": 1000,
            "actionTime": "1970/1/1 9:00:01"
        }"#;
        let entry: AlertLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.alert.alert_type, AlertType::LowStock);
        assert_eq!(entry.action, LogAction::Resolved);

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["actionTime"], "1970/1/1 9:00:01");
        assert_eq!(back["alert"]["type"], "low-stock");
    }
}
