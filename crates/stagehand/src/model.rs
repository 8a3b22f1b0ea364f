//! The capability a driven program exposes to the stage director.
//!
//! A stageable program is an Elm-style model: it reacts to messages in
//! [`StageModel::update`], renders itself as text, and answers a few
//! inspection queries (input buffer, mode, named conditions). The director
//! never mutates the model; it only feeds it events and observes snapshots.

use std::fmt;
use std::time::Duration;

/// Error returned by [`StageModel::close`].
pub type CloseError = Box<dyn std::error::Error + Send + Sync>;

/// Key codes the director can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Up,
    Down,
    Escape,
    Backspace,
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
}

impl KeyEvent {
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self { code }
    }

    /// Check if this is a specific character key.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }

    /// Name recorded in the action log (`enter`, `tab`, ... or the character).
    #[must_use]
    pub fn label(&self) -> String {
        match self.code {
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "enter".into(),
            KeyCode::Tab => "tab".into(),
            KeyCode::Up => "up".into(),
            KeyCode::Down => "down".into(),
            KeyCode::Escape => "escape".into(),
            KeyCode::Backspace => "backspace".into(),
        }
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::new(code)
    }
}

/// Events delivered to the driven program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(KeyEvent),
    /// Fired when a [`Cmd::Tick`] elapses.
    Tick,
    /// Free-form application message.
    Message(String),
}

impl Event {
    #[must_use]
    pub const fn key(code: KeyCode) -> Self {
        Self::Key(KeyEvent::new(code))
    }

    /// The key event, if this is one.
    #[must_use]
    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// Side effects requested by `init` and `update`.
#[derive(Debug)]
pub enum Cmd<M> {
    /// No operation.
    None,
    /// Stop the program loop. The last published state stays observable.
    Quit,
    /// Execute several commands.
    Batch(Vec<Cmd<M>>),
    /// Feed a message back into `update` before the next external event.
    Msg(M),
    /// Deliver an [`Event::Tick`] after a duration.
    Tick(Duration),
}

impl<M> Cmd<M> {
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    #[inline]
    pub fn quit() -> Self {
        Self::Quit
    }

    #[inline]
    pub fn msg(m: M) -> Self {
        Self::Msg(m)
    }

    #[inline]
    pub fn tick(after: Duration) -> Self {
        Self::Tick(after)
    }

    /// Create a batch, collapsing empty and single-element lists.
    pub fn batch(cmds: Vec<Self>) -> Self {
        if cmds.len() > 1 {
            return Self::Batch(cmds);
        }
        cmds.into_iter().next().unwrap_or(Self::None)
    }
}

impl<M> Default for Cmd<M> {
    fn default() -> Self {
        Self::None
    }
}

/// A program the stage director can drive.
///
/// The model lives on its own thread; the director observes clones of it
/// published after every update, so implementations must be cheap enough
/// to clone once per event.
///
/// # Example
///
/// ```
/// use stagehand::{Cmd, Event, KeyCode, StageModel};
///
/// #[derive(Clone, Default)]
/// struct Echo {
///     input: String,
/// }
///
/// impl StageModel for Echo {
///     type Message = Event;
///
///     fn update(&mut self, msg: Event) -> Cmd<Event> {
///         if let Event::Key(key) = msg
///             && let KeyCode::Char(c) = key.code
///         {
///             self.input.push(c);
///         }
///         Cmd::none()
///     }
///
///     fn render(&self) -> String {
///         format!("> {}", self.input)
///     }
///
///     fn current_input(&self) -> String {
///         self.input.clone()
///     }
///
///     fn current_mode(&self) -> String {
///         "input".into()
///     }
/// }
/// ```
pub trait StageModel: Clone + Send + Sync + 'static {
    /// Messages this model reacts to. Synthetic input arrives as [`Event`].
    type Message: From<Event> + fmt::Debug + Send + 'static;

    /// Called once on the program thread before any event.
    fn init(&mut self) -> Cmd<Self::Message> {
        Cmd::none()
    }

    /// Apply one message in place.
    fn update(&mut self, msg: Self::Message) -> Cmd<Self::Message>;

    /// Text rendering of the current state.
    fn render(&self) -> String;

    fn current_input(&self) -> String;

    fn current_mode(&self) -> String;

    /// Application-defined named predicate used by condition waits.
    fn check_condition(&self, _name: &str) -> bool {
        false
    }

    /// Report a malformed state after an update.
    ///
    /// An `Err` stops the program with an `INVALID_MODEL_STATE` fall.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Release resources when the director stops.
    fn close(&mut self) -> Result<(), CloseError> {
        Ok(())
    }
}
