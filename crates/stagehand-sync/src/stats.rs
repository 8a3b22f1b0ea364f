//! Immutable snapshot of the synchronization counters.

use std::collections::BTreeMap;

use serde::Serialize;

/// Point-in-time copy of every synchronization counter.
///
/// Counters are read one by one without a shared lock, so a snapshot taken
/// while updates are in flight is internally approximate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub updates_generated: u64,
    pub updates_sent: u64,
    pub updates_processed: u64,
    pub buffer_overflows: u64,
    pub sequence_gaps: u64,
    pub duplicate_updates: u64,
    pub updates_dropped: u64,
    pub buffer_length: u64,
    pub buffer_capacity: u64,
}

impl SyncStats {
    /// Keyed view with the stable metric names used in reports.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<&'static str, i64> {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        BTreeMap::from([
            ("updates_generated", clamp(self.updates_generated)),
            ("updates_sent", clamp(self.updates_sent)),
            ("updates_processed", clamp(self.updates_processed)),
            ("buffer_overflows", clamp(self.buffer_overflows)),
            ("sequence_gaps", clamp(self.sequence_gaps)),
            ("duplicate_updates", clamp(self.duplicate_updates)),
            ("updates_dropped", clamp(self.updates_dropped)),
            ("buffer_length", clamp(self.buffer_length)),
            ("buffer_capacity", clamp(self.buffer_capacity)),
        ])
    }

    /// Whether any update was lost or skipped on the way to the consumer.
    #[must_use]
    pub fn has_dropped_updates(&self) -> bool {
        self.updates_dropped > 0 || self.buffer_overflows > 0 || self.sequence_gaps > 0
    }

    /// Queue fill level as a percentage of capacity.
    #[must_use]
    pub fn buffer_utilization(&self) -> f64 {
        if self.buffer_capacity == 0 {
            return 0.0;
        }
        self.buffer_length as f64 / self.buffer_capacity as f64 * 100.0
    }

    /// `(name, value)` pairs for the counters that signal lost updates,
    /// skipping zeros.
    #[must_use]
    pub fn loss_counters(&self) -> Vec<(&'static str, u64)> {
        [
            ("buffer_overflows", self.buffer_overflows),
            ("sequence_gaps", self.sequence_gaps),
            ("updates_dropped", self.updates_dropped),
        ]
        .into_iter()
        .filter(|(_, v)| *v > 0)
        .collect()
    }
}
