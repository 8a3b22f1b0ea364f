//! Per-session trip collector.

use crate::policy::{Policy, RetryConfig};
use crate::trip::{Severity, Trip};

/// Collects every trip of one component and applies its [`Policy`].
///
/// Stumbles and trips (errors and falls) are kept apart, each in
/// chronological order.
#[derive(Debug, Clone)]
pub struct Handler {
    component: String,
    trips: Vec<Trip>,
    stumbles: Vec<Trip>,
    policy: Policy,
}

impl Handler {
    #[must_use]
    pub fn new(component: impl Into<String>, policy: Policy) -> Self {
        Self {
            component: component.into(),
            trips: Vec::new(),
            stumbles: Vec::new(),
            policy,
        }
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Record a trip, logging it at a level matching its severity.
    pub fn record(&mut self, trip: Trip) {
        match trip.severity {
            Severity::Fall => tracing::error!(
                target: "stagehand.trip",
                component = %self.component,
                kind = %trip.kind,
                "{}",
                trip.message
            ),
            Severity::Error => tracing::warn!(
                target: "stagehand.trip",
                component = %self.component,
                kind = %trip.kind,
                "{}",
                trip.message
            ),
            Severity::Stumble => tracing::debug!(
                target: "stagehand.trip",
                component = %self.component,
                kind = %trip.kind,
                attempt = trip.attempt,
                "{}",
                trip.message
            ),
        }

        if trip.severity == Severity::Stumble {
            self.stumbles.push(trip);
        } else {
            self.trips.push(trip);
        }
    }

    /// Whether the session may keep going under the current policy.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        if self.policy.stop_on_fall && self.has_fallen() {
            return false;
        }
        !(self.policy.max_stumbles > 0 && self.stumbles.len() > self.policy.max_stumbles)
    }

    #[must_use]
    pub fn has_fallen(&self) -> bool {
        self.trips.iter().any(Trip::is_fall)
    }

    #[must_use]
    pub fn has_trips(&self) -> bool {
        !self.trips.is_empty()
    }

    #[must_use]
    pub fn has_stumbles(&self) -> bool {
        !self.stumbles.is_empty()
    }

    #[must_use]
    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    #[must_use]
    pub fn stumbles(&self) -> &[Trip] {
        &self.stumbles
    }

    #[must_use]
    pub fn retry_config(&self, kind: &str) -> Option<RetryConfig> {
        self.policy.retry_policy.get(kind).copied()
    }

    /// Whether `kind` is in the policy's recoverable allowlist.
    #[must_use]
    pub fn can_recover(&self, kind: &str) -> bool {
        self.policy.recoverable_types.contains(kind)
    }

    /// One-line overview, e.g. `[stage_director] 2 trips, 1 stumbles`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.trips.is_empty() && self.stumbles.is_empty() {
            return format!("[{}] No issues during testing", self.component);
        }
        format!(
            "[{}] {} trips, {} stumbles",
            self.component,
            self.trips.len(),
            self.stumbles.len()
        )
    }

    /// Full numbered listing of every trip and stumble.
    #[must_use]
    pub fn detailed_report(&self) -> String {
        let mut report = format!("=== {} Component Report ===\n", self.component);
        report.push_str(&self.summary());
        report.push('\n');

        if !self.trips.is_empty() {
            report.push_str("\nTrips:\n");
            for (i, trip) in self.trips.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, trip.detailed_string()));
            }
        }

        if !self.stumbles.is_empty() {
            report.push_str("\nStumbles:\n");
            for (i, stumble) in self.stumbles.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, stumble.detailed_string()));
            }
        }

        report
    }
}
