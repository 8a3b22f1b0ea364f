//! Append-only log of harness-initiated steps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Type,
    Keypress,
    Wait,
    Assertion,
    Screenshot,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Keypress => "keypress",
            Self::Wait => "wait",
            Self::Assertion => "assertion",
            Self::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    Ok,
    /// The step ran and its check did not hold.
    Failed,
    /// The session was cancelled; the program was not touched.
    Skipped,
}

/// One recorded step. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub details: String,
    pub result: ActionResult,
}

impl Action {
    #[must_use]
    pub fn new(kind: ActionKind, details: impl Into<String>, result: ActionResult) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            details: details.into(),
            result,
        }
    }

    #[must_use]
    pub fn ok(kind: ActionKind, details: impl Into<String>) -> Self {
        Self::new(kind, details, ActionResult::Ok)
    }
}
