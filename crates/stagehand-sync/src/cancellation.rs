//! Session-scoped cooperative cancellation.
//!
//! [`CancellationToken`] is a cloneable signal observed by every thread a
//! stage session owns: the sync consumer, the program runner, and waits on
//! the caller's thread. Besides polling [`is_cancelled`](CancellationToken::is_cancelled),
//! a token exposes a channel that disconnects on cancel so it can sit in a
//! `crossbeam_channel::select!` next to real work:
//!
//! ```
//! use crossbeam_channel as channel;
//! use stagehand_sync::CancellationSource;
//! use std::time::Duration;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! let (_tx, work) = channel::unbounded::<u32>();
//!
//! let worker = std::thread::spawn(move || {
//!     loop {
//!         channel::select! {
//!             recv(token.receiver()) -> _ => return "cancelled",
//!             recv(work) -> _ => {}
//!         }
//!     }
//! });
//!
//! std::thread::sleep(Duration::from_millis(10));
//! source.cancel();
//! assert_eq!(worker.join().unwrap(), "cancelled");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};

/// A thread-safe, cloneable cancellation token.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationInner>,
}

/// The control handle that triggers cancellation.
///
/// Dropping the source does **not** cancel the token; call
/// [`cancel`](Self::cancel) explicitly.
pub struct CancellationSource {
    inner: Arc<CancellationInner>,
}

struct CancellationInner {
    cancelled: AtomicBool,
    // Dropped on cancel, which disconnects `signal` for every observer.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancellationSource {
    /// Create a new cancellation source with an uncancelled token.
    pub fn new() -> Self {
        let (trigger, signal) = channel::bounded(0);
        Self {
            inner: Arc::new(CancellationInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Obtain a cloneable token that observes this source's state.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Signal cancellation. All tokens observe `is_cancelled() == true` and
    /// every pending wait or select wakes.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let mut trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        trigger.take();
    }

    /// Check whether cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Returns `true` if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Channel that never carries a value and disconnects on cancel.
    ///
    /// Use it as a `recv` arm in `crossbeam_channel::select!`.
    #[inline]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until either cancellation is requested or the timeout elapses.
    ///
    /// Returns `true` if cancelled, `false` if timed out.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.signal.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
