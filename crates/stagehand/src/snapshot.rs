//! Point-in-time observations of the driven program.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::StageModel;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub view: String,
    pub mode: String,
    pub input: String,
}

impl Snapshot {
    /// Observe `model`, isolating each accessor so one panicking accessor
    /// does not blank the others.
    ///
    /// `phase` names the capture in placeholder text (`initial`, `final`, ...).
    #[must_use]
    pub fn guarded<M: StageModel>(model: &M, phase: &str) -> Self {
        let view = guard(|| model.render())
            .unwrap_or_else(|e| format!("ERROR: Could not get {phase} view due to panic: {e}"));
        let mode = guard(|| model.current_mode())
            .unwrap_or_else(|_| format!("error_{phase}_capture"));
        let input = guard(|| model.current_input())
            .unwrap_or_else(|e| format!("ERROR: Could not get {phase} input due to panic: {e}"));
        Self {
            timestamp: Utc::now(),
            view,
            mode,
            input,
        }
    }

    /// Snapshot describing a failure, embedding the last good view.
    #[must_use]
    pub fn error_state<M: StageModel>(model: &M, kind: &str, message: &str) -> Self {
        let last_view = guard(|| model.render())
            .unwrap_or_else(|e| format!("ERROR: Could not get view due to panic: {e}"));
        let input = guard(|| model.current_input())
            .unwrap_or_else(|e| format!("ERROR: Could not get input due to panic: {e}"));
        Self {
            timestamp: Utc::now(),
            view: format!("ERROR STATE ({kind})\n{message}\n\nLast View:\n{last_view}"),
            mode: format!("error_{kind}"),
            input,
        }
    }
}

/// Run `f`, turning a panic into its message.
pub(crate) fn guard<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
