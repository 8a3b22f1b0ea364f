#![forbid(unsafe_code)]

//! Stagehand trip model.
//!
//! Failures during a stage session are *trips*: tagged values carrying a
//! severity, a free-form context map, and a timestamp. A [`Handler`] collects
//! them for one session and applies a [`Policy`] to decide whether the session
//! may keep going.
//!
//! # Severity ladder
//!
//! - [`Severity::Stumble`] is informational and never fails a session.
//! - [`Severity::Error`] fails the session but the fluent chain continues.
//! - [`Severity::Fall`] fails the session and cancels it.
//!
//! # Example
//!
//! ```
//! use stagehand_trip::{Handler, Policy, Trip};
//!
//! let mut handler = Handler::new("stage_director", Policy::default());
//! handler.record(Trip::stumble("visual", "frame capture was slow"));
//! assert!(handler.should_continue());
//!
//! handler.record(Trip::fall("MODEL_PANIC", "update panicked"));
//! assert!(!handler.should_continue());
//! assert_eq!(handler.summary(), "[stage_director] 1 trips, 1 stumbles");
//! ```

pub mod handler;
pub mod policy;
pub mod trip;

pub use handler::Handler;
pub use policy::{Policy, PolicyError, RetryConfig};
pub use trip::{Severity, Trip, TripContext};
