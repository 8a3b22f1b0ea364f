//! [`Operator`]: a director that also films the session.
//!
//! Each tracking shot writes the current view through a [`FrameCapture`].
//! Failed captures are retried per the policy's `visual` retry settings;
//! every failed attempt is a `visual` stumble and running out of attempts is
//! a `visual` fall.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Utc;
use stagehand_trip::Trip;

use crate::action::{Action, ActionKind, ActionResult};
use crate::capture::{CaptureError, FrameCapture};
use crate::director::StageDirector;
use crate::model::StageModel;
use crate::result::StageResult;
use crate::snapshot::guard;

pub struct Operator<M: StageModel> {
    director: StageDirector<M>,
    capture: Box<dyn FrameCapture>,
    dir: PathBuf,
    frames: u32,
}

impl<M: StageModel> Operator<M> {
    pub fn new(model: M, dir: impl Into<PathBuf>, capture: impl FrameCapture + 'static) -> Self {
        Self::from_director(StageDirector::new(model), dir, capture)
    }

    /// Wrap an already configured director.
    pub fn from_director(
        director: StageDirector<M>,
        dir: impl Into<PathBuf>,
        capture: impl FrameCapture + 'static,
    ) -> Self {
        Self {
            director,
            capture: Box::new(capture),
            dir: dir.into(),
            frames: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    /// Frames written so far.
    pub fn frame_count(&self) -> u32 {
        self.frames
    }

    pub fn start(&mut self) -> &mut Self {
        self.director.start();
        self
    }

    pub fn stop(&mut self) -> StageResult {
        self.director.stop()
    }

    /// Write the current view to `frame_{timestamp}_{NNN}_{label}.{ext}`.
    pub fn capture_tracking_shot(&mut self, label: &str) -> &mut Self {
        let state = self.director.state();
        let view = guard(|| state.render())
            .unwrap_or_else(|e| format!("ERROR: Could not get view due to panic: {e}"));
        drop(state);

        let filename = format!(
            "frame_{}_{:03}_{}.{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.frames,
            sanitize(label),
            self.capture.extension()
        );
        let path = self.dir.join(&filename);

        let retry = self
            .director
            .handler()
            .retry_config("visual")
            .unwrap_or_default();
        let max_retries = retry.max_retries.min(self.director.config().max_retries);

        let mut attempt = 0;
        let error = loop {
            let err = match self.shoot(&view, &path) {
                Ok(()) => {
                    self.frames += 1;
                    tracing::debug!(target: "stagehand.director", frame = %path.display(), "tracking shot captured");
                    self.director.record_action(Action::ok(
                        ActionKind::Screenshot,
                        path.display().to_string(),
                    ));
                    return self;
                }
                Err(err) => err,
            };
            if attempt >= max_retries {
                break err;
            }
            attempt += 1;
            self.director.record_trip(
                Trip::stumble("visual", format!("Frame capture failed: {err}"))
                    .with_attempt(attempt)
                    .with_context("filename", filename.as_str())
                    .with_context("label", label),
            );
            let delay = retry.delay(attempt - 1);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        };

        self.director.record_trip(
            Trip::fall("visual", format!("Camera seizure during frame capture: {error}"))
                .with_attempt(attempt + 1)
                .with_context("filename", filename.as_str())
                .with_context("frame_count", self.frames)
                .with_context("original_error", error.to_string()),
        );
        self.director.record_action(Action::new(
            ActionKind::Screenshot,
            path.display().to_string(),
            ActionResult::Failed,
        ));
        self
    }

    fn shoot(&mut self, view: &str, path: &Path) -> Result<(), CaptureError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CaptureError::Io {
            path: self.dir.clone(),
            source,
        })?;
        self.capture.capture(view, path)
    }

    pub fn type_with_tracking_shot(&mut self, text: &str, label: &str) -> &mut Self {
        self.director.type_text(text);
        self.capture_tracking_shot(label)
    }

    pub fn press_enter_with_tracking_shot(&mut self, label: &str) -> &mut Self {
        self.director.press_enter();
        self.capture_tracking_shot(label)
    }

    pub fn press_tab_with_tracking_shot(&mut self, label: &str) -> &mut Self {
        self.director.press_tab();
        self.capture_tracking_shot(label)
    }

    pub fn wait_for_text_with_tracking_shot(&mut self, text: &str, label: &str) -> &mut Self {
        self.director.wait_for_text(text);
        self.capture_tracking_shot(label)
    }

    pub fn wait_for_mode_with_tracking_shot(&mut self, mode: &str, label: &str) -> &mut Self {
        self.director.wait_for_mode(mode);
        self.capture_tracking_shot(label)
    }
}

impl<M: StageModel> Deref for Operator<M> {
    type Target = StageDirector<M>;

    fn deref(&self) -> &Self::Target {
        &self.director
    }
}

impl<M: StageModel> DerefMut for Operator<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.director
    }
}

/// Keep labels usable as file name fragments.
fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
