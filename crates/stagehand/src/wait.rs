//! Condition waits: poll synchronized state until a predicate holds.
//!
//! Each wait checks its predicate, then sleeps on the session token for one
//! poll interval (or the time left, whichever is shorter), so cancellation
//! wakes it at once. A wait that runs out of time records a `timeout` trip
//! with [`Severity::Error`](stagehand_trip::Severity::Error). Before `start`,
//! after `stop`, and after a fall every wait returns immediately.

use std::time::Instant;

use stagehand_trip::Trip;

use crate::action::{Action, ActionKind, ActionResult};
use crate::config::StageConfig;
use crate::director::{StageDirector, duration_ms};
use crate::model::StageModel;
use crate::snapshot::guard;

/// What a wait is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WaitCondition {
    Mode(String),
    Text(String),
    Condition(String),
    SearchResults,
}

impl WaitCondition {
    /// Detail string for the action log.
    fn describe(&self) -> String {
        match self {
            Self::Mode(mode) => format!("mode={mode}"),
            Self::Text(text) => format!("text={text}"),
            Self::Condition(name) => format!("condition={name}"),
            Self::SearchResults => "search_results".to_string(),
        }
    }

    /// Evaluate against `model`. A panicking accessor counts as "not yet".
    fn is_met<M: StageModel>(&self, model: &M, config: &StageConfig) -> bool {
        guard(|| match self {
            Self::Mode(mode) => model.current_mode() == *mode,
            Self::Text(text) => model.render().contains(text.as_str()),
            Self::Condition(name) => model.check_condition(name),
            Self::SearchResults => shows_search_results(model, config),
        })
        .unwrap_or(false)
    }

    fn timeout_trip<M: StageModel>(&self, model: &M, config: &StageConfig) -> Trip {
        let view = guard(|| model.render()).unwrap_or_default();
        let timeout_ms = duration_ms(config.timeout);
        let trip = match self {
            Self::Mode(mode) => {
                let current = guard(|| model.current_mode()).unwrap_or_default();
                Trip::new(
                    "timeout",
                    format!("Timeout waiting for mode '{mode}', current mode '{current}'"),
                )
                .with_context("wait", "mode")
                .with_context("expected_mode", mode.as_str())
                .with_context("current_mode", current)
            }
            Self::Text(text) => Trip::new("timeout", format!("Timeout waiting for text '{text}'"))
                .with_context("wait", "text")
                .with_context("expected_text", text.as_str()),
            Self::Condition(name) => {
                Trip::new("timeout", format!("Timeout waiting for condition '{name}'"))
                    .with_context("wait", "condition")
                    .with_context("condition", name.as_str())
            }
            Self::SearchResults => Trip::new("timeout", "Timeout waiting for search results")
                .with_context("wait", "search_results")
                .with_context("markers", config.search_markers.clone())
                .with_context("condition", config.search_condition.as_str()),
        };
        trip.with_context("current_view", view)
            .with_context("current_input", guard(|| model.current_input()).unwrap_or_default())
            .with_context("timeout_ms", timeout_ms)
    }
}

/// Whether `model` shows search results: any configured marker is rendered,
/// or the configured condition holds.
pub(crate) fn shows_search_results<M: StageModel>(model: &M, config: &StageConfig) -> bool {
    let view = model.render();
    config
        .search_markers
        .iter()
        .any(|marker| view.contains(marker.as_str()))
        || model.check_condition(&config.search_condition)
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Met,
    TimedOut,
    Cancelled,
    Skipped,
}

impl<M: StageModel> StageDirector<M> {
    /// Block until the program reports `mode`.
    pub fn wait_for_mode(&mut self, mode: &str) -> &mut Self {
        self.wait_for(WaitCondition::Mode(mode.to_string()));
        self
    }

    /// Block until the rendered view contains `text`.
    pub fn wait_for_text(&mut self, text: &str) -> &mut Self {
        self.wait_for(WaitCondition::Text(text.to_string()));
        self
    }

    /// Block until the program's named condition holds.
    pub fn wait_for_condition(&mut self, name: &str) -> &mut Self {
        self.wait_for(WaitCondition::Condition(name.to_string()));
        self
    }

    /// Block until search results are shown, then let them settle briefly.
    pub fn wait_for_search_results(&mut self) -> &mut Self {
        if self.wait_for(WaitCondition::SearchResults) == WaitOutcome::Met
            && !self.config.search_settle.is_zero()
        {
            self.session.token().wait_timeout(self.config.search_settle);
        }
        self
    }

    pub(crate) fn wait_for(&mut self, condition: WaitCondition) -> WaitOutcome {
        let details = condition.describe();
        if !self.is_started() || self.session.has_fallen() {
            tracing::debug!(target: "stagehand.director", wait = %details, "wait skipped, stage not running");
            self.record_action(Action::new(ActionKind::Wait, details, ActionResult::Skipped));
            return WaitOutcome::Skipped;
        }

        let outcome = self.poll(&condition);
        let result = match outcome {
            WaitOutcome::Met => ActionResult::Ok,
            WaitOutcome::TimedOut => ActionResult::Failed,
            WaitOutcome::Cancelled | WaitOutcome::Skipped => ActionResult::Skipped,
        };
        self.record_action(Action::new(ActionKind::Wait, details, result));
        if outcome == WaitOutcome::Met {
            self.capture_snapshot();
        }
        outcome
    }

    fn poll(&self, condition: &WaitCondition) -> WaitOutcome {
        let token = self.session.token();
        let deadline = Instant::now() + self.config.timeout;
        loop {
            let state = self.sync.read();
            if condition.is_met(&*state, &self.config) {
                return WaitOutcome::Met;
            }
            let now = Instant::now();
            if now >= deadline {
                self.record_trip(condition.timeout_trip(&*state, &self.config));
                return WaitOutcome::TimedOut;
            }
            if token.wait_timeout(self.config.poll_interval.min(deadline - now)) {
                tracing::debug!(target: "stagehand.director", "wait interrupted by cancellation");
                return WaitOutcome::Cancelled;
            }
        }
    }
}
