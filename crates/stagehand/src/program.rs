//! The program thread: owns the model, feeds it messages, publishes states.
//!
//! Every successful `update` is followed by `validate` and a publish of a
//! clone of the model. A panic in either, or a validation failure, ends the
//! loop with a fall that cancels the session. `close` runs once when the
//! loop exits, whatever the reason.

use std::any::type_name;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender, select};
use stagehand_sync::UpdatePublisher;
use stagehand_trip::Trip;

use crate::model::{Cmd, Event, StageModel};
use crate::session::Session;
use crate::snapshot::{Snapshot, guard};

pub(crate) const MODEL_PANIC: &str = "MODEL_PANIC";
pub(crate) const INVALID_MODEL_STATE: &str = "INVALID_MODEL_STATE";

/// Progress the director polls to know an event was fully handled.
#[derive(Debug, Default)]
pub(crate) struct ProgramStatus {
    handled: AtomicU64,
    through_sequence: AtomicU64,
    running: AtomicBool,
}

impl ProgramStatus {
    /// Events fully handled, follow-up messages included.
    pub(crate) fn handled(&self) -> u64 {
        self.handled.load(Ordering::Acquire)
    }

    /// Last sequence published while handling the most recent event.
    pub(crate) fn through_sequence(&self) -> u64 {
        self.through_sequence.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ack(&self, sequence: u64) {
        self.through_sequence.store(sequence, Ordering::Release);
        self.handled.fetch_add(1, Ordering::AcqRel);
    }
}

/// Caller side of a running program.
pub(crate) struct ProgramHandle<M: StageModel> {
    events: Option<Sender<M::Message>>,
    status: Arc<ProgramStatus>,
    thread: Option<JoinHandle<()>>,
    /// Disconnects when the thread is about to exit.
    done: Receiver<()>,
    sent: u64,
}

impl<M: StageModel> ProgramHandle<M> {
    /// Spawn the program thread for `model`.
    pub(crate) fn spawn(
        model: M,
        publisher: UpdatePublisher<M>,
        session: Arc<Session>,
    ) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let status = Arc::new(ProgramStatus::default());
        status.running.store(true, Ordering::Release);

        let thread_status = Arc::clone(&status);
        let thread = thread::Builder::new()
            .name("stagehand-program".into())
            .spawn(move || {
                let _done = done_tx;
                let mut runner = Runner {
                    model,
                    publisher,
                    session,
                    ticks: Vec::new(),
                    running: true,
                    last_sequence: 0,
                };
                runner.run(&rx, &thread_status);
                thread_status.running.store(false, Ordering::Release);
                runner.close();
            });

        match thread {
            Ok(thread) => Ok(Self {
                events: Some(tx),
                status,
                thread: Some(thread),
                done: done_rx,
                sent: 0,
            }),
            Err(err) => {
                status.running.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Queue `event`; returns its ordinal, or `None` if the program is gone.
    pub(crate) fn send(&mut self, event: Event) -> Option<u64> {
        if !self.status.is_running() {
            return None;
        }
        let events = self.events.as_ref()?;
        events.send(M::Message::from(event)).ok()?;
        self.sent += 1;
        Some(self.sent)
    }

    pub(crate) fn status(&self) -> &ProgramStatus {
        &self.status
    }

    /// Disconnect the event queue and wait up to `timeout` for the thread
    /// to finish. A thread stuck inside the model is detached.
    ///
    /// Returns `false` if the thread was detached.
    pub(crate) fn join(&mut self, timeout: Duration) -> bool {
        self.events.take();
        let Some(thread) = self.thread.take() else {
            return true;
        };
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    target: "stagehand.program",
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "program thread still busy, detaching"
                );
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    tracing::error!(target: "stagehand.program", "program thread panicked");
                }
                true
            }
        }
    }
}

struct Runner<M: StageModel> {
    model: M,
    publisher: UpdatePublisher<M>,
    session: Arc<Session>,
    ticks: Vec<Instant>,
    running: bool,
    last_sequence: u64,
}

impl<M: StageModel> Runner<M> {
    fn run(&mut self, events: &Receiver<M::Message>, status: &ProgramStatus) {
        let token = self.session.token();

        let model = &mut self.model;
        let cmd = match guard(|| {
            let cmd = model.init();
            (cmd, model.validate())
        }) {
            Ok((cmd, Ok(()))) => cmd,
            Ok((_, Err(reason))) => {
                self.invalid(&reason, "init");
                return;
            }
            Err(panic) => {
                self.panicked(&panic, "init");
                return;
            }
        };
        self.publish();
        self.execute_cmd(cmd);
        tracing::debug!(target: "stagehand.program", "program initialized");

        while self.running {
            let timer = match self.ticks.iter().min() {
                Some(at) => channel::at(*at),
                None => channel::never(),
            };

            select! {
                recv(token.receiver()) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(msg) => {
                        if self.dispatch(msg) {
                            status.ack(self.last_sequence);
                        }
                    }
                    Err(_) => break,
                },
                recv(timer) -> _ => self.fire_ticks(),
            }
        }
        tracing::debug!(target: "stagehand.program", running = self.running, "program loop exited");
    }

    /// Apply one message. Returns `false` if the program failed.
    fn dispatch(&mut self, msg: M::Message) -> bool {
        let description = format!("{msg:?}");
        let model = &mut self.model;
        match guard(|| {
            let cmd = model.update(msg);
            (cmd, model.validate())
        }) {
            Ok((cmd, Ok(()))) => {
                self.publish();
                self.execute_cmd(cmd)
            }
            Ok((_, Err(reason))) => {
                self.invalid(&reason, &description);
                false
            }
            Err(panic) => {
                self.panicked(&panic, &description);
                false
            }
        }
    }

    fn execute_cmd(&mut self, cmd: Cmd<M::Message>) -> bool {
        match cmd {
            Cmd::None => true,
            Cmd::Quit => {
                self.running = false;
                true
            }
            Cmd::Msg(m) => self.dispatch(m),
            Cmd::Batch(cmds) => {
                for c in cmds {
                    if !self.execute_cmd(c) {
                        return false;
                    }
                }
                true
            }
            Cmd::Tick(after) => {
                self.ticks.push(Instant::now() + after);
                true
            }
        }
    }

    fn fire_ticks(&mut self) {
        let now = Instant::now();
        let due = self.ticks.iter().filter(|at| **at <= now).count();
        self.ticks.retain(|at| *at > now);
        for _ in 0..due {
            if !self.dispatch(M::Message::from(Event::Tick)) {
                return;
            }
        }
    }

    fn publish(&mut self) {
        self.last_sequence = self.publisher.publish_state(self.model.clone());
    }

    fn panicked(&mut self, panic: &str, message: &str) {
        let trip = Trip::fall(MODEL_PANIC, format!("Model panic during update: {panic}"))
            .with_context("panic_value", panic)
            .with_context("message", message)
            .with_context("model_type", type_name::<M>());
        self.fail("model_panic", &format!("Panic: {panic}"), trip);
    }

    fn invalid(&mut self, reason: &str, message: &str) {
        let trip = Trip::fall(INVALID_MODEL_STATE, format!("Invalid model state: {reason}"))
            .with_context("reason", reason)
            .with_context("message", message)
            .with_context("model_type", type_name::<M>());
        self.fail("invalid_model_state", reason, trip);
    }

    fn fail(&mut self, kind: &str, detail: &str, trip: Trip) {
        self.running = false;
        let last_good = self.publisher.read();
        self.session
            .push_snapshot(Snapshot::error_state(&*last_good, kind, detail));
        self.session.record_trip(trip);
    }

    fn close(&mut self) {
        let model = &mut self.model;
        let outcome = match guard(|| model.close()) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("panic: {panic}"),
        };
        self.session.record_trip(
            Trip::stumble("system", format!("failed to close model: {outcome}"))
                .with_context("model_type", type_name::<M>()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stagehand_sync::ModelSync;
    use stagehand_trip::Policy;

    use super::*;
    use crate::model::KeyCode;

    const JOIN: Duration = Duration::from_secs(2);

    #[derive(Clone, Default)]
    struct Counter {
        keys: usize,
        ticks: usize,
        echoed: usize,
    }

    impl StageModel for Counter {
        type Message = Event;

        fn update(&mut self, msg: Event) -> Cmd<Event> {
            match msg {
                Event::Key(key) if key.is_char('t') => {
                    self.keys += 1;
                    Cmd::tick(Duration::from_millis(5))
                }
                Event::Key(key) if key.is_char('e') => {
                    self.keys += 1;
                    Cmd::msg(Event::Message("echo".into()))
                }
                Event::Key(key) if key.is_char('z') => {
                    thread::sleep(Duration::from_millis(400));
                    Cmd::none()
                }
                Event::Key(key) if key.code == KeyCode::Escape => Cmd::quit(),
                Event::Key(_) => {
                    self.keys += 1;
                    Cmd::none()
                }
                Event::Tick => {
                    self.ticks += 1;
                    Cmd::none()
                }
                Event::Message(_) => {
                    self.echoed += 1;
                    Cmd::none()
                }
            }
        }

        fn render(&self) -> String {
            format!("{} {} {}", self.keys, self.ticks, self.echoed)
        }

        fn current_input(&self) -> String {
            String::new()
        }

        fn current_mode(&self) -> String {
            "count".into()
        }
    }

    fn wait_for(done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn launch() -> (ModelSync<Counter>, Arc<Session>, ProgramHandle<Counter>) {
        let session = Arc::new(Session::new(Policy::default()));
        let mut sync = ModelSync::new(Counter::default(), 16);
        sync.start(session.token()).unwrap();
        let program =
            ProgramHandle::spawn(Counter::default(), sync.publisher(), Arc::clone(&session))
                .unwrap();
        (sync, session, program)
    }

    #[test]
    fn follow_up_messages_complete_before_ack() {
        let (mut sync, session, mut program) = launch();
        assert_eq!(program.send(Event::key(KeyCode::Char('e'))), Some(1));
        assert!(wait_for(|| program.status().handled() == 1));
        // init publish + key + echo
        assert_eq!(program.status().through_sequence(), 3);
        assert!(sync.wait_for_sequence(3, Duration::from_secs(1)));
        assert_eq!(sync.read().render(), "1 0 1");
        session.cancel();
        program.join(JOIN);
        sync.shutdown();
    }

    #[test]
    fn tick_commands_fire_later() {
        let (mut sync, session, mut program) = launch();
        program.send(Event::key(KeyCode::Char('t')));
        assert!(wait_for(|| sync.read().render() == "1 1 0"));
        session.cancel();
        program.join(JOIN);
        sync.shutdown();
    }

    #[test]
    fn quit_stops_accepting_events() {
        let (mut sync, session, mut program) = launch();
        program.send(Event::key(KeyCode::Escape));
        assert!(wait_for(|| !program.status().is_running()));
        assert_eq!(program.send(Event::key(KeyCode::Char('x'))), None);
        session.cancel();
        program.join(JOIN);
        sync.shutdown();
    }

    #[test]
    fn cancel_ends_the_loop() {
        let (mut sync, session, mut program) = launch();
        session.cancel();
        program.join(JOIN);
        assert!(!program.status().is_running());
        sync.shutdown();
    }

    #[test]
    fn join_detaches_a_busy_program() {
        let (mut sync, session, mut program) = launch();
        program.send(Event::key(KeyCode::Char('z')));
        // let the thread pick the key up before cancelling
        thread::sleep(Duration::from_millis(50));
        session.cancel();
        let started = Instant::now();
        assert!(!program.join(Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_millis(300));
        sync.shutdown();
    }
}
