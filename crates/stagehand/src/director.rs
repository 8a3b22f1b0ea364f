//! [`StageDirector`]: lifecycle and observation of one driven program.
//!
//! ```text
//! Idle ──start()──▶ Started ──stop()──▶ Stopped
//!   └────────────────stop()─────────────────┘  (never-started result)
//! ```
//!
//! The director is single-use. Interactions, waits and assertions live in
//! their own modules as further `impl` blocks on the same type.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stagehand_sync::{ModelSync, SyncStats};
use stagehand_trip::{Handler, Policy, Trip};

use crate::action::Action;
use crate::config::StageConfig;
use crate::model::StageModel;
use crate::program::ProgramHandle;
use crate::result::StageResult;
use crate::session::Session;
use crate::snapshot::{Snapshot, guard};

pub(crate) const STARTUP_FAILED: &str = "STARTUP_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Stopped,
}

/// Drives a [`StageModel`] through synthetic input and records what happened.
///
/// Every fluent method returns `&mut Self`; failures are recorded as trips
/// rather than returned, so one run can collect several independent
/// failures. Call [`stop`](Self::stop) to obtain the [`StageResult`].
pub struct StageDirector<M: StageModel> {
    pub(crate) config: StageConfig,
    pub(crate) sync: ModelSync<M>,
    pub(crate) session: Arc<Session>,
    pub(crate) program: Option<ProgramHandle<M>>,
    pending: Option<M>,
    phase: Phase,
    started_at: Option<Instant>,
    result: Option<StageResult>,
}

impl<M: StageModel> StageDirector<M> {
    /// Director with [`StageConfig::default`] and [`Policy::default`].
    #[must_use]
    pub fn new(model: M) -> Self {
        Self::with_config(model, StageConfig::default())
    }

    #[must_use]
    pub fn with_config(model: M, config: StageConfig) -> Self {
        let config = config.validated();
        let sync = ModelSync::new(model.clone(), config.queue_capacity);
        Self {
            config,
            sync,
            session: Arc::new(Session::new(Policy::default())),
            program: None,
            pending: Some(model),
            phase: Phase::Idle,
            started_at: None,
            result: None,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    fn accepts_config(&self, setting: &'static str) -> bool {
        if self.phase == Phase::Idle {
            return true;
        }
        tracing::warn!(
            target: "stagehand.director",
            setting,
            "configuration change ignored after start"
        );
        false
    }

    /// Upper bound for waits and the startup readiness gate. Ignored after start.
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        if self.accepts_config("timeout") {
            self.config = self.config.clone().with_timeout(timeout).validated();
        }
        self
    }

    /// Enable or disable snapshot capture. Ignored after start.
    pub fn with_view_capture(&mut self, enabled: bool) -> &mut Self {
        if self.accepts_config("capture_views") {
            self.config.capture_views = enabled;
        }
        self
    }

    /// Replace the trip policy. Ignored after start.
    pub fn with_policy(&mut self, policy: Policy) -> &mut Self {
        if self.accepts_config("policy") {
            self.session.journal().handler = Handler::new(crate::session::COMPONENT, policy);
        }
        self
    }

    /// Launch the program and block until it renders a non-empty view.
    ///
    /// A second call is a no-op. If the program never becomes ready within
    /// the configured timeout a `STARTUP_FAILED` fall is recorded.
    pub fn start(&mut self) -> &mut Self {
        if self.phase != Phase::Idle {
            tracing::warn!(target: "stagehand.director", phase = ?self.phase, "start ignored");
            return self;
        }
        let Some(model) = self.pending.take() else {
            return self;
        };
        self.phase = Phase::Started;
        self.started_at = Some(Instant::now());

        if let Err(err) = self.sync.start(self.session.token()) {
            self.startup_failed(&format!("failed to spawn sync consumer: {err}"));
            return self;
        }
        match ProgramHandle::spawn(model, self.sync.publisher(), Arc::clone(&self.session)) {
            Ok(program) => self.program = Some(program),
            Err(err) => {
                self.startup_failed(&format!("failed to spawn program thread: {err}"));
                return self;
            }
        }

        if let Err(reason) = self.wait_until_ready() {
            // A fall recorded by the program thread already explains the failure.
            if !self.session.has_fallen() {
                self.startup_failed(reason);
            }
            return self;
        }

        if self.config.capture_views {
            let state = self.sync.read();
            self.session.push_snapshot(Snapshot::guarded(&*state, "initial"));
        }
        tracing::info!(target: "stagehand.director", "stage started");
        self
    }

    fn wait_until_ready(&self) -> Result<(), &'static str> {
        let token = self.session.token();
        let deadline = Instant::now() + self.config.timeout;
        loop {
            let (state, sequence) = self.sync.read_sequenced();
            if sequence > 0 && guard(|| state.render()).is_ok_and(|view| !view.is_empty()) {
                return Ok(());
            }
            let now = Instant::now();
            if token.is_cancelled() {
                return Err("session cancelled while waiting for program");
            }
            if now >= deadline {
                return Err("timeout waiting for program to be ready");
            }
            token.wait_timeout(self.config.poll_interval.min(deadline - now));
        }
    }

    fn startup_failed(&self, reason: &str) {
        self.session.record_trip(
            Trip::fall(STARTUP_FAILED, format!("Program failed to start: {reason}"))
                .with_context("error", reason)
                .with_context("timeout_ms", duration_ms(self.config.timeout)),
        );
    }

    /// Capture a final snapshot, shut the program down and build the result.
    ///
    /// A program still inside `update` after `view_change_timeout` is left
    /// to finish on its own. The journal is frozen once the result is built,
    /// so later fluent calls record nothing.
    ///
    /// Calling `stop` again returns the first result. Calling it before
    /// [`start`](Self::start) returns a failed "never started" result.
    pub fn stop(&mut self) -> StageResult {
        match self.phase {
            Phase::Idle => return StageResult::never_started(),
            Phase::Stopped => {
                if let Some(result) = &self.result {
                    return result.clone();
                }
            }
            Phase::Started => {}
        }

        if self.config.capture_views {
            let state = self.sync.read();
            self.session.push_snapshot(Snapshot::guarded(&*state, "final"));
        }

        self.session.cancel();
        if let Some(program) = self.program.as_mut() {
            program.join(self.config.view_change_timeout);
        }
        self.sync.shutdown();

        let duration = self.started_at.map(|at| at.elapsed()).unwrap_or_default();
        let result = StageResult::assemble(&self.session.seal(), duration, self.sync.stats());
        tracing::info!(
            target: "stagehand.director",
            success = result.success,
            actions = result.actions.len(),
            duration_ms = duration_ms(duration),
            "stage stopped"
        );
        self.phase = Phase::Stopped;
        self.result = Some(result.clone());
        result
    }

    pub fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    /// The latest synchronized state of the program.
    pub fn state(&self) -> Arc<M> {
        self.sync.read()
    }

    pub fn current_view(&self) -> String {
        self.sync.read().render()
    }

    pub fn current_mode(&self) -> String {
        self.sync.read().current_mode()
    }

    pub fn current_input(&self) -> String {
        self.sync.read().current_input()
    }

    /// Most recent snapshot, or an empty one if none was captured.
    pub fn latest_snapshot(&self) -> Snapshot {
        self.session
            .journal()
            .snapshots
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn action_count(&self) -> usize {
        self.session.journal().actions.len()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.session.journal().actions.clone()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Synchronization counters keyed by their report names.
    pub fn synchronization_stats(&self) -> BTreeMap<&'static str, i64> {
        self.sync.stats().as_map()
    }

    pub fn has_dropped_updates(&self) -> bool {
        self.sync.stats().has_dropped_updates()
    }

    /// Percentage of the update queue currently occupied.
    pub fn buffer_utilization(&self) -> f64 {
        self.sync.stats().buffer_utilization()
    }

    /// `true` once an error or fall was recorded, or the policy says stop.
    pub fn has_failed(&self) -> bool {
        let journal = self.session.journal();
        journal.failed || !journal.handler.should_continue()
    }

    pub fn last_trip(&self) -> Option<Trip> {
        self.session.journal().last_trip.clone()
    }

    /// A copy of the session's trip handler.
    pub fn handler(&self) -> Handler {
        self.session.journal().handler.clone()
    }

    pub(crate) fn record_action(&self, action: Action) {
        self.session.record_action(action);
    }

    pub(crate) fn record_trip(&self, trip: Trip) {
        self.session.record_trip(trip);
    }

    /// Append a snapshot of the current state if capture is enabled.
    pub(crate) fn capture_snapshot(&self) {
        if self.config.capture_views {
            let state = self.sync.read();
            self.session.push_snapshot(Snapshot::guarded(&*state, "current"));
        }
    }
}

impl<M: StageModel> Drop for StageDirector<M> {
    fn drop(&mut self) {
        if self.phase == Phase::Started {
            self.session.cancel();
        }
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
