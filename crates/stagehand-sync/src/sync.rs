//! Sequenced, non-blocking delivery of model snapshots.
//!
//! # Pipeline
//!
//! ```text
//! program thread                     consumer thread              caller thread
//! ──────────────                     ───────────────              ─────────────
//! publish_state(s) ──try_send──▶ [bounded queue] ──▶ apply ──write──▶ RwLock ◀──read── read()
//!        │ full: drop + count
//! ```
//!
//! The queue is bounded and `publish` uses `try_send`, so the driven program
//! is never slowed down by a slow observer. Dropped intermediate states are
//! acceptable because every later update carries the whole state.
//!
//! # Ordering
//!
//! The consumer keeps `last_processed_sequence` monotonic:
//!
//! - `sequence <= last`: counted in `duplicate_updates` and discarded.
//! - `sequence > last + 1`: counted in `sequence_gaps`, then applied.
//! - otherwise applied.
//!
//! Every counter is its own atomic; no invariant spans two of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};

use crate::cancellation::CancellationToken;
use crate::stats::SyncStats;

/// One state transition emitted by the driven program.
#[derive(Debug, Clone)]
pub struct ModelUpdate<T> {
    pub state: T,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl<T> ModelUpdate<T> {
    /// Stamp `state` with `sequence` and the current wall-clock time.
    pub fn new(state: T, sequence: u64) -> Self {
        Self {
            state,
            sequence,
            timestamp: Utc::now(),
        }
    }
}

struct SyncedState<T> {
    latest: Arc<T>,
    last_processed_sequence: u64,
}

#[derive(Default)]
struct Counters {
    updates_generated: AtomicU64,
    updates_sent: AtomicU64,
    updates_processed: AtomicU64,
    buffer_overflows: AtomicU64,
    sequence_gaps: AtomicU64,
    duplicate_updates: AtomicU64,
    updates_dropped: AtomicU64,
    last_processed_sequence: AtomicU64,
}

struct Shared<T> {
    state: RwLock<SyncedState<T>>,
    counters: Counters,
    // Notified after every update the consumer takes off the queue.
    progress: (Mutex<()>, Condvar),
}

impl<T> Shared<T> {
    fn apply(&self, update: ModelUpdate<T>) {
        let counters = &self.counters;
        {
            let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
            let current = guard.last_processed_sequence;
            if update.sequence <= current {
                counters.duplicate_updates.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    target: "stagehand.sync",
                    sequence = update.sequence,
                    current,
                    "discarding stale update"
                );
            } else {
                if update.sequence > current + 1 {
                    counters.sequence_gaps.fetch_add(1, Ordering::Relaxed);
                }
                guard.latest = Arc::new(update.state);
                guard.last_processed_sequence = update.sequence;
                counters
                    .last_processed_sequence
                    .store(update.sequence, Ordering::Release);
                counters.updates_processed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.notify();
    }

    fn notify(&self) {
        let (lock, cvar) = &self.progress;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        cvar.notify_all();
    }

    /// Block until `done()` holds or `timeout` elapses.
    fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &self.progress;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = cvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = next;
        }
    }
}

/// Producer handle given to the driven program's update loop.
///
/// Cheap to clone; every clone shares the same sequence generator.
pub struct UpdatePublisher<T> {
    tx: Sender<ModelUpdate<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for UpdatePublisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> UpdatePublisher<T> {
    /// Allocate the next sequence number (starting at 1).
    pub fn next_sequence(&self) -> u64 {
        self.shared
            .counters
            .updates_generated
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    /// Try to enqueue `update` without blocking.
    ///
    /// Returns `false` when the update was dropped.
    pub fn publish(&self, update: ModelUpdate<T>) -> bool {
        let counters = &self.shared.counters;
        match self.tx.try_send(update) {
            Ok(()) => {
                counters.updates_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(dropped)) => {
                counters.buffer_overflows.fetch_add(1, Ordering::Relaxed);
                counters.updates_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    target: "stagehand.sync",
                    sequence = dropped.sequence,
                    "update queue full, dropping update"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                counters.updates_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Sequence, timestamp and publish `state`; returns the sequence used.
    pub fn publish_state(&self, state: T) -> u64 {
        let sequence = self.next_sequence();
        self.publish(ModelUpdate::new(state, sequence));
        sequence
    }

    /// Last sequence the consumer applied.
    pub fn last_processed_sequence(&self) -> u64 {
        self.shared
            .counters
            .last_processed_sequence
            .load(Ordering::Acquire)
    }

    /// The latest state the consumer applied, as observers see it.
    pub fn read(&self) -> Arc<T> {
        let guard = self.shared.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard.latest)
    }
}

/// Harness-owned view of the driven program's latest state.
pub struct ModelSync<T> {
    shared: Arc<Shared<T>>,
    tx: Sender<ModelUpdate<T>>,
    rx: Receiver<ModelUpdate<T>>,
    capacity: usize,
    stop: Option<Sender<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> ModelSync<T> {
    /// Create the synchronized cell holding `initial`, with a queue of
    /// `capacity` slots (at least one). No consumer runs until
    /// [`start`](Self::start).
    pub fn new(initial: T, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(SyncedState {
                    latest: Arc::new(initial),
                    last_processed_sequence: 0,
                }),
                counters: Counters::default(),
                progress: (Mutex::new(()), Condvar::new()),
            }),
            tx,
            rx,
            capacity,
            stop: None,
            consumer: None,
        }
    }

    /// Spawn the consumer thread. Calling it again while running is a no-op.
    ///
    /// The consumer exits when `token` is cancelled or on [`shutdown`](Self::shutdown),
    /// without draining the queue.
    pub fn start(&mut self, token: CancellationToken) -> std::io::Result<()> {
        if self.consumer.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let rx = self.rx.clone();
        let handle = thread::Builder::new()
            .name("stagehand-sync".into())
            .spawn(move || consume(&shared, &rx, &token, &stop_rx))?;
        self.stop = Some(stop_tx);
        self.consumer = Some(handle);
        Ok(())
    }

    /// Whether a consumer thread has been started and not yet joined.
    pub fn is_running(&self) -> bool {
        self.consumer.is_some()
    }

    /// Stop the consumer and wait for it to exit.
    pub fn shutdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.consumer.take()
            && handle.join().is_err()
        {
            tracing::error!(target: "stagehand.sync", "sync consumer panicked");
        }
    }
}

impl<T> ModelSync<T> {
    pub fn publisher(&self) -> UpdatePublisher<T> {
        UpdatePublisher {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// The latest applied state.
    pub fn read(&self) -> Arc<T> {
        let guard = self.shared.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard.latest)
    }

    /// The latest applied state together with its sequence number.
    pub fn read_sequenced(&self) -> (Arc<T>, u64) {
        let guard = self.shared.state.read().unwrap_or_else(|e| e.into_inner());
        (Arc::clone(&guard.latest), guard.last_processed_sequence)
    }

    pub fn last_processed_sequence(&self) -> u64 {
        self.shared
            .counters
            .last_processed_sequence
            .load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until an update with sequence `>= sequence` has been applied.
    pub fn wait_for_sequence(&self, sequence: u64, timeout: Duration) -> bool {
        self.shared
            .wait_until(timeout, || self.last_processed_sequence() >= sequence)
    }

    /// Block until every update that made it into the queue has been taken
    /// off it and either applied or discarded.
    pub fn wait_for_drain(&self, timeout: Duration) -> bool {
        let counters = &self.shared.counters;
        self.shared.wait_until(timeout, || {
            let handled = counters.updates_processed.load(Ordering::Relaxed)
                + counters.duplicate_updates.load(Ordering::Relaxed);
            handled >= counters.updates_sent.load(Ordering::Relaxed)
        })
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.shared.counters;
        SyncStats {
            updates_generated: c.updates_generated.load(Ordering::Relaxed),
            updates_sent: c.updates_sent.load(Ordering::Relaxed),
            updates_processed: c.updates_processed.load(Ordering::Relaxed),
            buffer_overflows: c.buffer_overflows.load(Ordering::Relaxed),
            sequence_gaps: c.sequence_gaps.load(Ordering::Relaxed),
            duplicate_updates: c.duplicate_updates.load(Ordering::Relaxed),
            updates_dropped: c.updates_dropped.load(Ordering::Relaxed),
            buffer_length: self.rx.len() as u64,
            buffer_capacity: self.capacity as u64,
        }
    }
}

impl<T> Drop for ModelSync<T> {
    fn drop(&mut self) {
        // Signal without joining; the consumer exits on its next select.
        self.stop.take();
    }
}

fn consume<T>(
    shared: &Shared<T>,
    rx: &Receiver<ModelUpdate<T>>,
    token: &CancellationToken,
    stop: &Receiver<()>,
) {
    tracing::debug!(target: "stagehand.sync", "sync consumer started");
    while !token.is_cancelled() {
        channel::select! {
            recv(token.receiver()) -> _ => break,
            recv(stop) -> _ => break,
            recv(rx) -> msg => match msg {
                Ok(update) => shared.apply(update),
                Err(_) => break,
            },
        }
    }
    tracing::debug!(
        target: "stagehand.sync",
        processed = shared.counters.updates_processed.load(Ordering::Relaxed),
        pending = rx.len(),
        "sync consumer stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationSource;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn read_returns_initial_state_before_any_update() {
        let sync = ModelSync::new(7u32, 4);
        assert_eq!(*sync.read(), 7);
        assert_eq!(sync.last_processed_sequence(), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let sync = ModelSync::new((), 0);
        assert_eq!(sync.capacity(), 1);
        assert_eq!(sync.stats().buffer_capacity, 1);
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let sync = ModelSync::new(0u32, 4);
        let publisher = sync.publisher();
        assert_eq!(publisher.next_sequence(), 1);
        assert_eq!(publisher.next_sequence(), 2);
        assert_eq!(sync.publisher().next_sequence(), 3);
        assert_eq!(sync.stats().updates_generated, 3);
    }

    #[test]
    fn consumer_applies_in_order() {
        let source = CancellationSource::new();
        let mut sync = ModelSync::new(0u32, 8);
        sync.start(source.token()).unwrap();
        let publisher = sync.publisher();
        for value in 1..=5u32 {
            publisher.publish_state(value * 10);
        }
        assert!(sync.wait_for_sequence(5, WAIT));
        assert_eq!(*sync.read(), 50);
        let stats = sync.stats();
        assert_eq!(stats.updates_processed, 5);
        assert_eq!(stats.sequence_gaps, 0);
        assert_eq!(stats.duplicate_updates, 0);
        source.cancel();
        sync.shutdown();
    }

    #[test]
    fn gap_is_counted_but_applied() {
        let source = CancellationSource::new();
        let mut sync = ModelSync::new("init", 8);
        sync.start(source.token()).unwrap();
        let publisher = sync.publisher();
        publisher.publish(ModelUpdate::new("one", 1));
        publisher.publish(ModelUpdate::new("four", 4));
        assert!(sync.wait_for_sequence(4, WAIT));
        assert_eq!(*sync.read(), "four");
        assert_eq!(sync.stats().sequence_gaps, 1);
        sync.shutdown();
    }

    #[test]
    fn start_twice_is_noop() {
        let source = CancellationSource::new();
        let mut sync = ModelSync::new((), 2);
        sync.start(source.token()).unwrap();
        sync.start(source.token()).unwrap();
        assert!(sync.is_running());
        sync.shutdown();
        assert!(!sync.is_running());
    }

    #[test]
    fn shutdown_without_cancel_joins_consumer() {
        let source = CancellationSource::new();
        let mut sync = ModelSync::new((), 2);
        sync.start(source.token()).unwrap();
        sync.shutdown();
        assert!(!source.is_cancelled());
    }

    #[test]
    fn drain_wait_accounts_for_duplicates() {
        let source = CancellationSource::new();
        let mut sync = ModelSync::new(0u64, 8);
        let publisher = sync.publisher();
        publisher.publish(ModelUpdate::new(2, 2));
        publisher.publish(ModelUpdate::new(1, 1));
        sync.start(source.token()).unwrap();
        assert!(sync.wait_for_drain(WAIT));
        let stats = sync.stats();
        assert_eq!(stats.updates_processed + stats.duplicate_updates, 2);
        assert_eq!(*sync.read(), 2);
        sync.shutdown();
    }
}
