//! The artifact a stopped session hands to reports and dashboards.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use stagehand_sync::SyncStats;
use stagehand_trip::Trip;
use stagehand_trip::trip::display_value;

use crate::action::Action;
use crate::session::Journal;
use crate::snapshot::Snapshot;

const NEVER_STARTED: &str = "stage director was never started";

/// Outcome of one stage session. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub actions: Vec<Action>,
    pub snapshots: Vec<Snapshot>,
    /// `false` iff an error or fall trip was recorded.
    pub success: bool,
    /// Time from `start` to `stop`.
    #[serde(rename = "duration_ms", with = "crate::config::duration_ms")]
    pub duration: Duration,
    /// `[kind] message` of the last recorded trip.
    pub error_message: String,
    pub error: Option<Trip>,
    pub error_details: String,
    pub trip_report: String,
    pub sync_stats: SyncStats,
}

impl StageResult {
    pub(crate) fn never_started() -> Self {
        Self {
            actions: Vec::new(),
            snapshots: Vec::new(),
            success: false,
            duration: Duration::ZERO,
            error_message: NEVER_STARTED.to_string(),
            error: None,
            error_details: String::new(),
            trip_report: String::new(),
            sync_stats: SyncStats::default(),
        }
    }

    pub(crate) fn assemble(journal: &Journal, duration: Duration, stats: SyncStats) -> Self {
        let last = journal.last_trip.as_ref();
        Self {
            actions: journal.actions.clone(),
            snapshots: journal.snapshots.clone(),
            success: !journal.failed,
            duration,
            error_message: last
                .map(|trip| format!("[{}] {}", trip.kind.to_lowercase(), trip.message))
                .unwrap_or_default(),
            error: last.cloned(),
            error_details: last.map(|trip| error_details(trip, &stats)).unwrap_or_default(),
            trip_report: last
                .map(|_| journal.handler.detailed_report())
                .unwrap_or_default(),
            sync_stats: stats,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Actions whose result was not `Ok`.
    pub fn failed_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|action| action.result != crate::action::ActionResult::Ok)
    }
}

fn error_details(trip: &Trip, stats: &SyncStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Trip Type: {}", trip.kind);
    let _ = writeln!(out, "Error: {}", trip.message);
    let _ = writeln!(out, "Timestamp: {}", trip.timestamp.to_rfc3339());
    if !trip.context.is_empty() {
        out.push_str("Context:\n");
        for (key, value) in &trip.context {
            let _ = writeln!(out, "  {key}: {}", display_value(value));
        }
    }
    let losses = stats.loss_counters();
    if !losses.is_empty() {
        out.push_str("\nSynchronization Issues:\n");
        for (name, count) in losses {
            let _ = writeln!(out, "  {name}: {count}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use stagehand_trip::{Handler, Policy};

    use super::*;

    fn journal() -> Journal {
        Journal {
            actions: Vec::new(),
            snapshots: Vec::new(),
            handler: Handler::new("stage_director", Policy::default()),
            last_trip: None,
            failed: false,
            sealed: false,
        }
    }

    #[test]
    fn never_started_is_a_failure_with_empty_logs() {
        let result = StageResult::never_started();
        assert!(!result.success);
        assert_eq!(result.error_message, NEVER_STARTED);
        assert!(result.actions.is_empty());
        assert!(result.snapshots.is_empty());
    }

    #[test]
    fn clean_session_has_no_error_text() {
        let result = StageResult::assemble(&journal(), Duration::from_millis(12), SyncStats::default());
        assert!(result.success);
        assert!(result.error_message.is_empty());
        assert!(result.error_details.is_empty());
        assert!(result.trip_report.is_empty());
    }

    #[test]
    fn last_trip_drives_error_fields() {
        let mut journal = journal();
        let trip = Trip::new("TIMEOUT", "gave up").with_context("expected_text", "never");
        journal.handler.record(trip.clone());
        journal.last_trip = Some(trip);
        journal.failed = true;

        let stats = SyncStats {
            buffer_overflows: 2,
            updates_dropped: 2,
            ..SyncStats::default()
        };
        let result = StageResult::assemble(&journal, Duration::ZERO, stats);
        assert!(!result.success);
        assert_eq!(result.error_message, "[timeout] gave up");
        assert!(result.error_details.starts_with("Trip Type: TIMEOUT\nError: gave up\n"));
        assert!(result.error_details.contains("  expected_text: never"));
        assert!(result.error_details.contains("Synchronization Issues:\n  buffer_overflows: 2"));
        assert!(result.trip_report.starts_with("=== stage_director Component Report ==="));
    }

    #[test]
    fn json_uses_millisecond_duration() {
        let result = StageResult::assemble(&journal(), Duration::from_millis(1500), SyncStats::default());
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["success"], true);
        assert_eq!(json["sync_stats"]["updates_processed"], 0);
    }
}
