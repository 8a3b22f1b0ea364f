//! State shared between the caller's thread and the program thread.

use std::sync::{Mutex, MutexGuard};

use stagehand_sync::{CancellationSource, CancellationToken};
use stagehand_trip::{Handler, Policy, Trip};

use crate::action::Action;
use crate::snapshot::Snapshot;

/// Component name used in trip reports.
pub(crate) const COMPONENT: &str = "stage_director";

/// Everything a session accumulates until `stop`.
pub(crate) struct Journal {
    pub(crate) actions: Vec<Action>,
    pub(crate) snapshots: Vec<Snapshot>,
    pub(crate) handler: Handler,
    pub(crate) last_trip: Option<Trip>,
    pub(crate) failed: bool,
    /// Set by `stop`; later records are discarded.
    pub(crate) sealed: bool,
}

pub(crate) struct Session {
    journal: Mutex<Journal>,
    cancel: CancellationSource,
}

impl Session {
    pub(crate) fn new(policy: Policy) -> Self {
        Self {
            journal: Mutex::new(Journal {
                actions: Vec::new(),
                snapshots: Vec::new(),
                handler: Handler::new(COMPONENT, policy),
                last_trip: None,
                failed: false,
                sealed: false,
            }),
            cancel: CancellationSource::new(),
        }
    }

    pub(crate) fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.token()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hand `trip` to the handler. Errors and falls mark the session failed;
    /// a fall also cancels it.
    pub(crate) fn record_trip(&self, trip: Trip) {
        let fall = trip.is_fall();
        {
            let mut journal = self.journal();
            if journal.sealed {
                tracing::debug!(target: "stagehand.director", kind = %trip.kind, "trip after stop discarded");
                return;
            }
            if !trip.can_recover() {
                journal.failed = true;
            }
            journal.handler.record(trip.clone());
            journal.last_trip = Some(trip);
        }
        if fall {
            self.cancel();
        }
    }

    pub(crate) fn record_action(&self, action: Action) {
        let mut journal = self.journal();
        if !journal.sealed {
            journal.actions.push(action);
        }
    }

    pub(crate) fn push_snapshot(&self, snapshot: Snapshot) {
        let mut journal = self.journal();
        if !journal.sealed {
            journal.snapshots.push(snapshot);
        }
    }

    /// Freeze the journal. Returns the guard so the caller can read the
    /// final contents without a window for late writes.
    pub(crate) fn seal(&self) -> MutexGuard<'_, Journal> {
        let mut journal = self.journal();
        journal.sealed = true;
        journal
    }

    pub(crate) fn has_fallen(&self) -> bool {
        self.journal().handler.has_fallen()
    }
}
