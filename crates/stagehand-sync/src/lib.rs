#![forbid(unsafe_code)]

//! Stagehand synchronization core.
//!
//! The driven program runs on its own thread and publishes a snapshot of its
//! state after every update. [`ModelSync`] makes the most recent snapshot
//! observable from other threads:
//!
//! - [`UpdatePublisher::publish`] never blocks. A full queue drops the update
//!   and bumps the overflow counters.
//! - A single consumer thread applies updates in sequence order, rejecting
//!   anything at or below the last applied sequence.
//! - [`ModelSync::read`] returns the latest applied state under a read lock.
//!
//! Session-wide shutdown is driven by a [`CancellationToken`].
//!
//! # Example
//!
//! ```
//! use stagehand_sync::{CancellationSource, ModelSync};
//!
//! let source = CancellationSource::new();
//! let mut sync = ModelSync::new(String::from("boot"), 50);
//! sync.start(source.token()).unwrap();
//!
//! let publisher = sync.publisher();
//! let seq = publisher.publish_state(String::from("ready"));
//! assert!(sync.wait_for_sequence(seq, std::time::Duration::from_secs(1)));
//! assert_eq!(sync.read().as_str(), "ready");
//!
//! source.cancel();
//! sync.shutdown();
//! ```

pub mod cancellation;
pub mod stats;
pub mod sync;

pub use cancellation::{CancellationSource, CancellationToken};
pub use stats::SyncStats;
pub use sync::{ModelSync, ModelUpdate, UpdatePublisher};
