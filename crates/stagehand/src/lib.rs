#![forbid(unsafe_code)]

//! Stagehand
//!
//! A headless stage director for tests: it runs an Elm-style model on its
//! own thread, feeds it synthetic keystrokes, waits for observable state,
//! asserts on the rendered view, and reports what happened.
//!
//! # Key Components
//!
//! - [`StageModel`] - The capability a driven program implements
//! - [`StageDirector`] - Lifecycle, interactions, waits and assertions
//! - [`Operator`] - A director that also writes tracking-shot frames
//! - [`StageConfig`] - Timeouts, delays and snapshot settings
//! - [`StageResult`] - The artifact produced by [`StageDirector::stop`]
//!
//! Failures are recorded as [`Trip`]s rather than returned, so a single run
//! can surface several independent problems. State synchronization lives in
//! `stagehand-sync`; the trip model in `stagehand-trip`.
//!
//! # Example
//!
//! ```
//! use stagehand::{Cmd, Event, KeyCode, StageConfig, StageDirector, StageModel};
//!
//! #[derive(Clone, Default)]
//! struct Greeter {
//!     input: String,
//!     output: String,
//! }
//!
//! impl StageModel for Greeter {
//!     type Message = Event;
//!
//!     fn update(&mut self, msg: Event) -> Cmd<Event> {
//!         if let Event::Key(key) = msg {
//!             match key.code {
//!                 KeyCode::Char(c) => self.input.push(c),
//!                 KeyCode::Enter => self.output = format!("Hello, {}!", self.input),
//!                 _ => {}
//!             }
//!         }
//!         Cmd::none()
//!     }
//!
//!     fn render(&self) -> String {
//!         format!("> {}\n{}", self.input, self.output)
//!     }
//!
//!     fn current_input(&self) -> String {
//!         self.input.clone()
//!     }
//!
//!     fn current_mode(&self) -> String {
//!         let mode = if self.output.is_empty() { "input" } else { "result" };
//!         mode.into()
//!     }
//! }
//!
//! let mut director = StageDirector::with_config(Greeter::default(), StageConfig::fast());
//! director
//!     .start()
//!     .type_text("Ada")
//!     .press_enter()
//!     .wait_for_mode("result")
//!     .assert_view_contains("Hello, Ada!");
//! let result = director.stop();
//! assert!(result.success);
//! ```

pub mod action;
mod assertions;
pub mod capture;
pub mod config;
mod director;
mod interactions;
pub mod model;
pub mod operator;
mod program;
pub mod result;
mod session;
pub mod snapshot;
mod wait;

pub use action::{Action, ActionKind, ActionResult};
pub use capture::{CaptureError, FrameCapture, TextFrameCapture};
pub use config::{ConfigError, StageConfig};
pub use director::StageDirector;
pub use model::{CloseError, Cmd, Event, KeyCode, KeyEvent, StageModel};
pub use operator::Operator;
pub use result::StageResult;
pub use snapshot::Snapshot;

pub use stagehand_sync::SyncStats;
pub use stagehand_trip::{Handler, Policy, RetryConfig, Severity, Trip};
