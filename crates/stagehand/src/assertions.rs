//! Assertions against the latest synchronized state.
//!
//! A failed assertion records an `assertion` trip with expected and actual
//! values plus a `Failed` action, then lets the chain continue.

use stagehand_trip::Trip;

use crate::action::{Action, ActionKind, ActionResult};
use crate::director::StageDirector;
use crate::model::StageModel;
use crate::snapshot::guard;
use crate::wait::shows_search_results;

impl<M: StageModel> StageDirector<M> {
    pub fn assert_view_contains(&mut self, text: &str) -> &mut Self {
        let state = self.sync.read();
        let view = guard(|| state.render()).unwrap_or_default();
        let failure = (!view.contains(text)).then(|| {
            Trip::new(
                "assertion",
                format!("View does not contain expected text: {text}"),
            )
            .with_context("expected", text)
            .with_context("actual_view", view)
        });
        self.conclude(format!("contains={text}"), failure)
    }

    pub fn assert_mode(&mut self, expected: &str) -> &mut Self {
        let state = self.sync.read();
        let actual = guard(|| state.current_mode()).unwrap_or_default();
        let failure = (actual != expected).then(|| {
            Trip::new(
                "assertion",
                format!("Expected mode '{expected}', got '{actual}'"),
            )
            .with_context("expected", expected)
            .with_context("actual", actual)
        });
        self.conclude(format!("mode={expected}"), failure)
    }

    pub fn assert_input_equals(&mut self, expected: &str) -> &mut Self {
        let state = self.sync.read();
        let actual = guard(|| state.current_input()).unwrap_or_default();
        let failure = (actual != expected).then(|| {
            Trip::new(
                "assertion",
                format!("Expected input '{expected}', got '{actual}'"),
            )
            .with_context("expected", expected)
            .with_context("actual", actual)
        });
        self.conclude(format!("input={expected}"), failure)
    }

    /// Assert that neither a search marker nor the search condition is showing.
    pub fn assert_no_search_results(&mut self) -> &mut Self {
        let state = self.sync.read();
        let found = guard(|| shows_search_results(&*state, &self.config)).unwrap_or(false);
        let failure = found.then(|| {
            Trip::new("assertion", "Expected no search results, but found some")
                .with_context("expected", "no search results")
                .with_context("actual_view", guard(|| state.render()).unwrap_or_default())
        });
        self.conclude("no_search_results".to_string(), failure)
    }

    /// Assert that the program's named condition holds.
    pub fn assert_condition(&mut self, name: &str) -> &mut Self {
        let state = self.sync.read();
        let holds = guard(|| state.check_condition(name)).unwrap_or(false);
        let failure = (!holds).then(|| {
            Trip::new("assertion", format!("Condition '{name}' is not met"))
                .with_context("expected", name)
                .with_context("actual", false)
        });
        self.conclude(format!("condition={name}"), failure)
    }

    fn conclude(&mut self, details: String, failure: Option<Trip>) -> &mut Self {
        let result = match failure {
            Some(trip) => {
                self.record_trip(trip);
                ActionResult::Failed
            }
            None => ActionResult::Ok,
        };
        self.record_action(Action::new(ActionKind::Assertion, details, result));
        self
    }
}
