// =============================================================================
// ALERT LOG STORE
// =============================================================================
// Append-only, retention-bounded log of alert lifecycle events.
//
// OPERATIONS:
// - append:  add one entry, then evict expired entries and write back
// - load:    read, evict expired entries (writing the trimmed set back),
//            return newest first
// - clear:   delete everything
// - query_by_facet / FacetCounts: pure filtering of a loaded log
//
// RETENTION:
// An entry is expired once `now - timestamp >= 30 days`. Eviction only runs
// inside append and load; an idle store keeps its old entries until the
// next call.
//
// FAILURE SEMANTICS:
// Alert history is best effort. Storage failures are logged and counted,
// never returned: a failed read behaves like an empty log and a failed write
// is dropped. An append never writes over a blob it could not read, so a
// payload this build cannot decode survives until an explicit clear.
//
// LEARNING NOTE:
// Every read-evict-write sequence runs under one async mutex, so two
// concurrent appends can never both read the old blob and lose an entry.
// =============================================================================

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::LogBackend;
use crate::error::StorageError;
use crate::metrics;
use crate::models::{format_action_time, AlertDetails, AlertLogEntry, AlertType, LogAction};

/// Storage key of the log blob
pub const LOG_STORAGE_KEY: &str = "toilet_paper_alert_logs";

pub const LOG_RETENTION_DAYS: i64 = 30;

/// Retention window in milliseconds
pub const LOG_RETENTION_MS: i64 = LOG_RETENTION_DAYS * 24 * 60 * 60 * 1000;

// =============================================================================
// STORE
// =============================================================================
pub struct AlertLogStore<B> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: LogBackend> AlertLogStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // -------------------------------------------------------------------------
    // APPEND
    // -------------------------------------------------------------------------
    /// Record `action` for `alert` at the current time.
    ///
    /// The returned entry is what was (or would have been) persisted; a
    /// storage failure is logged and does not surface here.
    pub async fn append(&self, alert: &AlertDetails, action: LogAction) -> AlertLogEntry {
        self.append_at(alert, action, Utc::now()).await
    }

    /// Same as [`append`](Self::append) with an explicit clock reading
    pub async fn append_at(
        &self,
        alert: &AlertDetails,
        action: LogAction,
        now: DateTime<Utc>,
    ) -> AlertLogEntry {
        let start = Instant::now();
        let now_ms = now.timestamp_millis();
        let entry = AlertLogEntry {
            id: new_entry_id(now_ms),
            alert: alert.clone(),
            action,
            timestamp: now_ms,
            action_time: format_action_time(now_ms),
        };

        let _guard = self.write_lock.lock().await;

        // Unreadable or undecodable history is left untouched; only `clear`
        // may delete it
        let mut entries = match self.read_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                self.report("append", &err);
                return entry;
            }
        };

        entries.push(entry.clone());
        evict_expired(&mut entries, now_ms);

        match self.write_entries(&entries).await {
            Ok(()) => {
                metrics::set_alert_log_entries(entries.len());
                info!(
                    log_id = %entry.id,
                    alert_id = %entry.alert.id,
                    action = entry.action.as_str(),
                    "Alert log entry recorded"
                );
            }
            Err(err) => self.report("append", &err),
        }

        metrics::record_alert_log_operation("append", start.elapsed().as_secs_f64());
        entry
    }

    // -------------------------------------------------------------------------
    // LOAD
    // -------------------------------------------------------------------------
    /// Surviving entries, newest first
    pub async fn load(&self) -> Vec<AlertLogEntry> {
        self.load_at(Utc::now()).await
    }

    pub async fn load_at(&self, now: DateTime<Utc>) -> Vec<AlertLogEntry> {
        let start = Instant::now();
        let now_ms = now.timestamp_millis();
        let _guard = self.write_lock.lock().await;

        let mut entries = match self.read_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                self.report("load", &err);
                return Vec::new();
            }
        };

        if evict_expired(&mut entries, now_ms) > 0 {
            if let Err(err) = self.write_entries(&entries).await {
                self.report("load", &err);
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        metrics::set_alert_log_entries(entries.len());
        metrics::record_alert_log_operation("load", start.elapsed().as_secs_f64());
        entries
    }

    // -------------------------------------------------------------------------
    // CLEAR
    // -------------------------------------------------------------------------
    /// Delete every entry. Irreversible; callers gate this behind an explicit
    /// confirmation.
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;

        match self.backend.remove().await {
            Ok(()) => {
                metrics::set_alert_log_entries(0);
                info!(backend = self.backend.kind(), "Alert log cleared");
            }
            Err(err) => self.report("clear", &err),
        }
    }

    // -------------------------------------------------------------------------
    // BLOB (DE)SERIALIZATION
    // -------------------------------------------------------------------------
    async fn read_entries(&self) -> Result<Vec<AlertLogEntry>, StorageError> {
        match self.backend.read().await? {
            Some(payload) if !payload.trim().is_empty() => Ok(serde_json::from_str(&payload)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn write_entries(&self, entries: &[AlertLogEntry]) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(entries).map_err(|e| StorageError::Write(e.to_string()))?;
        self.backend.write(payload).await
    }

    fn report(&self, operation: &'static str, err: &StorageError) {
        metrics::record_storage_error(operation);
        error!(
            operation = operation,
            backend = self.backend.kind(),
            error = %err,
            "Alert log storage failed; continuing without history"
        );
    }
}

/// Remove expired entries in place, returning how many were dropped
fn evict_expired(entries: &mut Vec<AlertLogEntry>, now_ms: i64) -> usize {
    let before = entries.len();
    entries.retain(|entry| now_ms.saturating_sub(entry.timestamp) < LOG_RETENTION_MS);
    let evicted = before - entries.len();

    if evicted > 0 {
        metrics::record_alert_log_evictions(evicted);
        debug!(evicted, remaining = entries.len(), "Evicted expired alert log entries");
    }
    evicted
}

/// "log-<epoch ms>-<9 random hex chars>"
fn new_entry_id(now_ms: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("log-{now_ms}-{}", &suffix[..9])
}

// =============================================================================
// FACETS
// =============================================================================

/// Filter over a loaded log. Unset fields match everything.
///
/// # Example
/// GET /api/v1/alert-log?type=theft&action=resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LogFacet {
    #[serde(default, rename = "type")]
    pub alert_type: Option<AlertType>,

    #[serde(default)]
    pub action: Option<LogAction>,
}

impl LogFacet {
    pub fn of_type(alert_type: AlertType) -> Self {
        Self {
            alert_type: Some(alert_type),
            action: None,
        }
    }

    pub fn of_action(action: LogAction) -> Self {
        Self {
            alert_type: None,
            action: Some(action),
        }
    }

    pub fn matches(&self, entry: &AlertLogEntry) -> bool {
        self.alert_type.map_or(true, |t| entry.alert.alert_type == t)
            && self.action.map_or(true, |a| entry.action == a)
    }
}

/// Entries of `entries` matching `facet`, order preserved
pub fn query_by_facet<'a>(entries: &'a [AlertLogEntry], facet: &LogFacet) -> Vec<&'a AlertLogEntry> {
    entries.iter().filter(|e| facet.matches(e)).collect()
}

/// Counts shown on the alert log summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FacetCounts {
    pub total: usize,
    pub theft: usize,
    pub malfunction: usize,
    pub created: usize,
    pub resolved: usize,
}

impl FacetCounts {
    pub fn from_entries(entries: &[AlertLogEntry]) -> Self {
        let count = |facet: LogFacet| query_by_facet(entries, &facet).len();
        Self {
            total: entries.len(),
            theft: count(LogFacet::of_type(AlertType::Theft)),
            malfunction: count(LogFacet::of_type(AlertType::Malfunction)),
            created: count(LogFacet::of_action(LogAction::Created)),
            resolved: count(LogFacet::of_action(LogAction::Resolved)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::AlertSeverity;
    use chrono::{Duration, TimeZone};

    fn alert(id: &str, alert_type: AlertType) -> AlertDetails {
        AlertDetails {
            id: id.to_string(),
            alert_type,
            severity: AlertSeverity::Critical,
            title: "Suspected theft".into(),
            description: "Unusual consumption".into(),
            location: "2F / stall-02".into(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
    }

    async fn stored(store: &AlertLogStore<MemoryBackend>) -> Vec<AlertLogEntry> {
        match store.backend().read().await.unwrap() {
            Some(payload) => serde_json::from_str(&payload).unwrap(),
            None => Vec::new(),
        }
    }

    /// Backend whose medium is always unavailable
    struct UnavailableBackend;

    impl LogBackend for UnavailableBackend {
        async fn read(&self) -> Result<Option<String>, StorageError> {
            Err(StorageError::Read("medium offline".into()))
        }
        async fn write(&self, _payload: String) -> Result<(), StorageError> {
            Err(StorageError::Write("medium offline".into()))
        }
        async fn remove(&self) -> Result<(), StorageError> {
            Err(StorageError::Write("medium offline".into()))
        }
        async fn health_check(&self) -> bool {
            false
        }
        fn kind(&self) -> &'static str {
            "unavailable"
        }
    }

    #[tokio::test]
    async fn created_then_resolved_loads_newest_first() {
        let store = AlertLogStore::new(MemoryBackend::new());
        let a = alert("alert-1", AlertType::Theft);

        store.append_at(&a, LogAction::Created, t0()).await;
        store
            .append_at(&a, LogAction::Resolved, t0() + Duration::milliseconds(1000))
            .await;

        let loaded = store.load_at(t0() + Duration::days(29)).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].action, LogAction::Resolved);
        assert_eq!(loaded[1].action, LogAction::Created);
        assert_eq!(loaded[0].timestamp - loaded[1].timestamp, 1000);
    }

    #[tokio::test]
    async fn retention_boundary_is_exclusive() {
        let store = AlertLogStore::new(MemoryBackend::new());
        store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;

        let just_inside = t0() + Duration::milliseconds(LOG_RETENTION_MS - 1);
        assert_eq!(store.load_at(just_inside).await.len(), 1);

        let at_boundary = t0() + Duration::milliseconds(LOG_RETENTION_MS);
        assert!(store.load_at(at_boundary).await.is_empty());
    }

    #[tokio::test]
    async fn eviction_only_happens_on_calls() {
        let store = AlertLogStore::new(MemoryBackend::new());
        store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;

        // Nothing trims an idle store, however old its entries are
        assert_eq!(stored(&store).await.len(), 1);

        // load writes the trimmed set back to the medium
        store.load_at(t0() + Duration::days(31)).await;
        assert!(stored(&store).await.is_empty());
    }

    #[tokio::test]
    async fn append_evicts_from_stored_collection() {
        let store = AlertLogStore::new(MemoryBackend::new());
        store.append_at(&alert("old", AlertType::Theft), LogAction::Created, t0()).await;

        let later = t0() + Duration::days(30);
        let fresh = store
            .append_at(&alert("new", AlertType::Malfunction), LogAction::Created, later)
            .await;

        let raw = stored(&store).await;
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].id, fresh.id);
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let store = AlertLogStore::new(MemoryBackend::new());
        for i in 0..3 {
            let at = t0() + Duration::minutes(i);
            store.append_at(&alert("a", AlertType::Theft), LogAction::Created, at).await;
        }

        store.clear().await;
        assert!(store.load_at(t0()).await.is_empty());
        assert_eq!(store.backend().read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_payload_loads_as_empty_and_survives_append() {
        let store = AlertLogStore::new(MemoryBackend::with_payload("{not json"));
        assert!(store.load_at(t0()).await.is_empty());

        store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;
        assert_eq!(store.backend().read().await.unwrap().as_deref(), Some("{not json"));

        // Only an explicit clear gets rid of it
        store.clear().await;
        store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;
        assert_eq!(store.load_at(t0()).await.len(), 1);
    }

    #[tokio::test]
    async fn undecodable_entry_keeps_valid_history_on_append() {
        let valid = serde_json::to_value(AlertLogEntry {
            id: "log-kept".into(),
            alert: alert("x", AlertType::Theft),
            action: LogAction::Created,
            timestamp: t0().timestamp_millis(),
            action_time: String::new(),
        })
        .unwrap();
        let mut unknown = valid.clone();
        unknown["id"] = "log-unknown".into();
        unknown["alert"]["type"] = "vandalism".into();
        let payload = serde_json::to_string(&vec![valid, unknown]).unwrap();

        let store = AlertLogStore::new(MemoryBackend::with_payload(payload.clone()));
        store
            .append_at(&alert("y", AlertType::Theft), LogAction::Created, t0() + Duration::minutes(1))
            .await;

        assert_eq!(store.backend().read().await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn extreme_timestamps_do_not_break_eviction() {
        let entry = |id: &str, timestamp: i64| AlertLogEntry {
            id: id.into(),
            alert: alert(id, AlertType::Theft),
            action: LogAction::Created,
            timestamp,
            action_time: String::new(),
        };
        let payload = serde_json::to_string(&vec![
            entry("ancient", i64::MIN),
            entry("future", i64::MAX),
            entry("recent", t0().timestamp_millis()),
        ])
        .unwrap();
        let store = AlertLogStore::new(MemoryBackend::with_payload(payload));

        let ids: Vec<String> = store.load_at(t0()).await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["future", "recent"]);

        store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;
        assert!(stored(&store).await.iter().all(|e| e.id != "ancient"));
    }

    #[tokio::test]
    async fn unavailable_medium_degrades_to_empty() {
        let store = AlertLogStore::new(UnavailableBackend);

        let entry = store.append_at(&alert("a", AlertType::Theft), LogAction::Created, t0()).await;
        assert_eq!(entry.action, LogAction::Created);
        assert!(store.load_at(t0()).await.is_empty());
        store.clear().await;
    }

    #[tokio::test]
    async fn entries_snapshot_the_alert() {
        let store = AlertLogStore::new(MemoryBackend::new());
        let mut a = alert("alert-1", AlertType::Theft);
        store.append_at(&a, LogAction::Created, t0()).await;

        a.title = "Edited later".into();

        let loaded = store.load_at(t0()).await;
        assert_eq!(loaded[0].alert.title, "Suspected theft");
    }

    #[tokio::test]
    async fn entry_ids_are_unique() {
        let store = AlertLogStore::new(MemoryBackend::new());
        let a = alert("a", AlertType::Theft);
        let first = store.append_at(&a, LogAction::Created, t0()).await;
        let second = store.append_at(&a, LogAction::Created, t0()).await;

        assert_ne!(first.id, second.id);
        assert!(first.id.starts_with(&format!("log-{}-", t0().timestamp_millis())));
    }

    #[test]
    fn facets_filter_by_type_and_action() {
        let entry = |id: &str, t: AlertType, action: LogAction, ts: i64| AlertLogEntry {
            id: id.into(),
            alert: alert(id, t),
            action,
            timestamp: ts,
            action_time: String::new(),
        };
        let entries = vec![
            entry("1", AlertType::Theft, LogAction::Resolved, 4),
            entry("2", AlertType::Theft, LogAction::Created, 3),
            entry("3", AlertType::Malfunction, LogAction::Created, 2),
            entry("4", AlertType::LowStock, LogAction::Created, 1),
        ];

        let theft_resolved = LogFacet {
            alert_type: Some(AlertType::Theft),
            action: Some(LogAction::Resolved),
        };
        let ids: Vec<&str> = query_by_facet(&entries, &theft_resolved)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(query_by_facet(&entries, &LogFacet::default()).len(), 4);

        assert_eq!(
            FacetCounts::from_entries(&entries),
            FacetCounts {
                total: 4,
                theft: 2,
                malfunction: 1,
                created: 3,
                resolved: 1,
            }
        );
    }
}
