//! Tagged failure values with severity and debugging context.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured debugging information attached to a trip.
///
/// Ordered so that reports render keys deterministically.
pub type TripContext = BTreeMap<String, Value>;

/// How serious a trip is and how the session reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor issue that does not affect the validity of the run.
    Stumble,
    /// Significant issue. The session is marked failed but keeps running.
    Error,
    /// Unrecoverable issue. The session is marked failed and cancelled.
    Fall,
}

impl Severity {
    /// Lowercase label used in messages and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stumble => "stumble",
            Self::Error => "error",
            Self::Fall => "fall",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure observed during a stage session.
///
/// `kind` is the error category (`timeout`, `assertion`, `visual`, `system`,
/// `STARTUP_FAILED`, `MODEL_PANIC`, `INVALID_MODEL_STATE`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub context: TripContext,
    pub timestamp: DateTime<Utc>,
    /// Which retry attempt produced this trip (0 when not retried).
    #[serde(default)]
    pub attempt: u32,
    pub severity: Severity,
}

impl Trip {
    /// Create a trip with [`Severity::Error`], the default severity.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            context: TripContext::new(),
            timestamp: Utc::now(),
            attempt: 0,
            severity: Severity::Error,
        }
    }

    /// Create a trip with [`Severity::Stumble`].
    #[must_use]
    pub fn stumble(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_severity(Severity::Stumble)
    }

    /// Create a trip with [`Severity::Fall`].
    #[must_use]
    pub fn fall(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_severity(Severity::Fall)
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach one context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach every entry of `context`, overwriting existing keys.
    #[must_use]
    pub fn with_context_map(mut self, context: TripContext) -> Self {
        self.context.extend(context);
        self
    }

    /// Returns `true` if the session can carry on as if nothing happened.
    ///
    /// Only stumbles are recoverable; errors and falls fail the session.
    #[inline]
    #[must_use]
    pub fn can_recover(&self) -> bool {
        self.severity == Severity::Stumble
    }

    #[inline]
    #[must_use]
    pub fn is_fall(&self) -> bool {
        self.severity == Severity::Fall
    }

    /// Look up a single context value.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Multi-line description including timestamp, attempt and context.
    ///
    /// ```text
    /// [assertion:error] Expected mode result, got typing
    ///   Time: 14:03:07.412
    ///   Context:
    ///     actual: typing
    ///     expected: result
    /// ```
    #[must_use]
    pub fn detailed_string(&self) -> String {
        let mut out = format!("{self}");
        out.push_str(&format!(
            "\n  Time: {}",
            self.timestamp.format("%H:%M:%S%.3f")
        ));
        if self.attempt > 0 {
            out.push_str(&format!("\n  Attempt: {}", self.attempt));
        }
        if !self.context.is_empty() {
            out.push_str("\n  Context:");
            for (key, value) in &self.context {
                out.push_str(&format!("\n    {key}: {}", display_value(value)));
            }
        }
        out
    }
}

impl fmt::Display for Trip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.kind, self.severity, self.message)
    }
}

impl std::error::Error for Trip {}

/// Render a context value the way a person reads it: bare strings, JSON for
/// everything else.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
