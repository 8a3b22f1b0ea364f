//! Test-double models shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use stagehand::{CloseError, Cmd, Event, KeyCode, StageConfig, StageModel};

/// Fast deterministic settings: no typing delay, short timeout.
pub fn fast_config() -> StageConfig {
    StageConfig::fast().with_timeout(Duration::from_secs(2))
}

/// Greets whatever was typed when Enter is pressed; Up recalls history.
#[derive(Clone, Default)]
pub struct SimpleRepl {
    input: String,
    output: String,
    history: Vec<String>,
}

impl StageModel for SimpleRepl {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        let Event::Key(key) = msg else {
            return Cmd::none();
        };
        match key.code {
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                self.output = format!("Hello, {0}! You entered: {0}", self.input);
                self.history.push(std::mem::take(&mut self.input));
            }
            KeyCode::Up => {
                if let Some(last) = self.history.last() {
                    self.input = last.clone();
                }
            }
            KeyCode::Escape => {
                self.input.clear();
                self.output.clear();
            }
            KeyCode::Tab | KeyCode::Down => {}
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!("> {}\n{}", self.input, self.output)
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        let mode = if self.output.is_empty() { "input" } else { "result" };
        mode.into()
    }
}

/// `initial` until a key is typed, `typing` while editing, `result` after Enter.
#[derive(Clone)]
pub struct MockRepl {
    mode: &'static str,
    input: String,
    output: String,
}

impl Default for MockRepl {
    fn default() -> Self {
        Self {
            mode: "initial",
            input: String::new(),
            output: String::new(),
        }
    }
}

impl StageModel for MockRepl {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        let Event::Key(key) = msg else {
            return Cmd::none();
        };
        match key.code {
            KeyCode::Char(c) => {
                self.input.push(c);
                self.mode = "typing";
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                self.output = format!("processed: {}", self.input);
                self.mode = "result";
            }
            KeyCode::Escape => *self = Self::default(),
            _ => {}
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!(
            "Mode: {}\nInput: {}\nOutput: {}",
            self.mode, self.input, self.output
        )
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        self.mode.into()
    }

    fn check_condition(&self, name: &str) -> bool {
        name == "has_output" && !self.output.is_empty()
    }
}

/// Panics in `update` when `!` is typed.
#[derive(Clone, Default)]
pub struct PanickingRepl {
    input: String,
}

impl StageModel for PanickingRepl {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        if let Event::Key(key) = msg
            && let KeyCode::Char(c) = key.code
        {
            if c == '!' {
                panic!("simulated model panic");
            }
            self.input.push(c);
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!("> {}", self.input)
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        "input".into()
    }
}

/// Never renders anything, so it never becomes ready.
#[derive(Clone, Default)]
pub struct BlankModel;

impl StageModel for BlankModel {
    type Message = Event;

    fn update(&mut self, _msg: Event) -> Cmd<Event> {
        Cmd::none()
    }

    fn render(&self) -> String {
        String::new()
    }

    fn current_input(&self) -> String {
        String::new()
    }

    fn current_mode(&self) -> String {
        "blank".into()
    }
}

/// Reports an invalid state once the input grows past three characters.
#[derive(Clone, Default)]
pub struct InvalidatingRepl {
    input: String,
}

impl StageModel for InvalidatingRepl {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        if let Event::Key(key) = msg
            && let KeyCode::Char(c) = key.code
        {
            self.input.push(c);
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!("> {}", self.input)
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        "input".into()
    }

    fn validate(&self) -> Result<(), String> {
        if self.input.chars().count() > 3 {
            return Err(format!("input too long: {}", self.input));
        }
        Ok(())
    }
}

/// Enter starts a search whose results arrive on a later tick.
#[derive(Clone, Default)]
pub struct DelayedResultsRepl {
    query: String,
    searching: bool,
    results: Vec<String>,
}

impl StageModel for DelayedResultsRepl {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        match msg {
            Event::Key(key) => match key.code {
                KeyCode::Char(c) => self.query.push(c),
                KeyCode::Enter => {
                    self.searching = true;
                    return Cmd::tick(Duration::from_millis(30));
                }
                _ => {}
            },
            Event::Tick if self.searching => {
                self.searching = false;
                self.results = vec![format!("{}.rs", self.query), format!("{}_test.rs", self.query)];
            }
            _ => {}
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        let mut view = format!("Search: {}", self.query);
        if self.searching {
            view.push_str("\nsearching...");
        }
        if !self.results.is_empty() {
            view.push_str(&format!("\nFound {} matches", self.results.len()));
            for result in &self.results {
                view.push_str(&format!("\n  {result}"));
            }
        }
        view
    }

    fn current_input(&self) -> String {
        self.query.clone()
    }

    fn current_mode(&self) -> String {
        let mode = if self.searching {
            "searching"
        } else if self.results.is_empty() {
            "query"
        } else {
            "results"
        };
        mode.into()
    }

    fn check_condition(&self, name: &str) -> bool {
        match name {
            "search_results" => !self.results.is_empty(),
            "searching" => self.searching,
            _ => false,
        }
    }
}

/// Flags when `close` runs; Escape quits the program loop.
#[derive(Clone)]
pub struct ClosingModel {
    pub closed: Arc<AtomicBool>,
    pub fail_close: bool,
    input: String,
}

impl ClosingModel {
    pub fn new(fail_close: bool) -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            fail_close,
            input: String::new(),
        }
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl StageModel for ClosingModel {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        if let Event::Key(key) = msg {
            match key.code {
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Escape => return Cmd::quit(),
                _ => {}
            }
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!("closing> {}", self.input)
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        "input".into()
    }

    fn close(&mut self) -> Result<(), CloseError> {
        self.closed.store(true, Ordering::Release);
        if self.fail_close {
            return Err("disk full".into());
        }
        Ok(())
    }
}

/// Blocks inside `update` for `stall` whenever 's' is typed.
#[derive(Clone)]
pub struct StallingModel {
    stall: Duration,
    input: String,
}

impl StallingModel {
    pub fn new(stall: Duration) -> Self {
        Self {
            stall,
            input: String::new(),
        }
    }
}

impl StageModel for StallingModel {
    type Message = Event;

    fn update(&mut self, msg: Event) -> Cmd<Event> {
        if let Event::Key(key) = msg {
            if key.is_char('s') {
                std::thread::sleep(self.stall);
            }
            if let KeyCode::Char(c) = key.code {
                self.input.push(c);
            }
        }
        Cmd::none()
    }

    fn render(&self) -> String {
        format!("stall> {}", self.input)
    }

    fn current_input(&self) -> String {
        self.input.clone()
    }

    fn current_mode(&self) -> String {
        "input".into()
    }
}
