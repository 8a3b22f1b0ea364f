//! Synthetic input delivered to the program.
//!
//! Each delivery waits (up to `view_change_timeout`) for the program to
//! react: the view changes, or the event and its follow-up messages are
//! handled and the resulting state is observable. Running out of time here
//! is normal and not recorded as a trip.

use std::thread;
use std::time::{Duration, Instant};

use crate::action::{Action, ActionKind, ActionResult};
use crate::director::StageDirector;
use crate::model::{Event, KeyCode, KeyEvent, StageModel};
use crate::snapshot::guard;

/// Poll interval while waiting for the program to react to input.
const REACTION_POLL: Duration = Duration::from_millis(2);

impl<M: StageModel> StageDirector<M> {
    /// Type `text` one character at a time, pausing `typing_delay` between keys.
    pub fn type_text(&mut self, text: &str) -> &mut Self {
        for c in text.chars() {
            let result = self.deliver(Event::key(KeyCode::Char(c)));
            self.record_action(Action::new(ActionKind::Type, c.to_string(), result));
            if result != ActionResult::Skipped {
                self.pause(self.config.typing_delay);
            }
        }
        self
    }

    /// Send a single key and record it as a keypress.
    pub fn press(&mut self, code: KeyCode) -> &mut Self {
        let key = KeyEvent::new(code);
        let result = self.deliver(Event::Key(key));
        self.record_action(Action::new(ActionKind::Keypress, key.label(), result));
        self
    }

    pub fn press_enter(&mut self) -> &mut Self {
        self.press(KeyCode::Enter)
    }

    pub fn press_tab(&mut self) -> &mut Self {
        self.press(KeyCode::Tab)
    }

    pub fn press_arrow_up(&mut self) -> &mut Self {
        self.press(KeyCode::Up)
    }

    pub fn press_arrow_down(&mut self) -> &mut Self {
        self.press(KeyCode::Down)
    }

    pub fn press_escape(&mut self) -> &mut Self {
        self.press(KeyCode::Escape)
    }

    pub fn press_backspace(&mut self) -> &mut Self {
        self.press(KeyCode::Backspace)
    }

    /// Backspace once per character of the input as it is right now.
    pub fn clear_input(&mut self) -> &mut Self {
        let state = self.sync.read();
        let count = guard(|| state.current_input())
            .map(|input| input.chars().count())
            .unwrap_or(0);
        drop(state);

        let gap = self.config.typing_delay / 4;
        for _ in 0..count {
            self.press_backspace();
            if !gap.is_zero() {
                self.pause(gap);
            }
        }
        self
    }

    /// Sleep for `duration` without touching the program.
    pub fn wait(&mut self, duration: Duration) -> &mut Self {
        thread::sleep(duration);
        self.record_action(Action::ok(ActionKind::Wait, format!("{duration:?}")));
        self.capture_snapshot();
        self
    }

    /// Pause that ends early on cancellation.
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.session.token().wait_timeout(duration);
        }
    }

    /// Send `event` and wait for the program to react.
    fn deliver(&mut self, event: Event) -> ActionResult {
        if self.session.is_cancelled() {
            return ActionResult::Skipped;
        }
        let before = self.sync.read();
        let previous = guard(|| before.render()).unwrap_or_default();
        drop(before);

        let Some(ordinal) = self.program.as_mut().and_then(|program| program.send(event)) else {
            tracing::debug!(target: "stagehand.director", "program not running, input skipped");
            return ActionResult::Skipped;
        };
        self.await_reaction(&previous, ordinal);
        self.capture_snapshot();
        ActionResult::Ok
    }

    fn await_reaction(&self, previous: &str, ordinal: u64) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        let status = program.status();
        let token = self.session.token();
        let deadline = Instant::now() + self.config.view_change_timeout;
        loop {
            if status.handled() >= ordinal
                && self.sync.last_processed_sequence() >= status.through_sequence()
            {
                return;
            }
            let state = self.sync.read();
            if guard(|| state.render()).is_ok_and(|view| view != previous) {
                return;
            }
            if !status.is_running() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::trace!(target: "stagehand.director", ordinal, "no view change before timeout");
                return;
            }
            if token.wait_timeout(REACTION_POLL.min(deadline - now)) {
                return;
            }
        }
    }
}
