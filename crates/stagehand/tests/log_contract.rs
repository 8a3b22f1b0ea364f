//! Tracing events emitted on the caller's thread.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{SimpleRepl, fast_config};
use stagehand::StageDirector;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone)]
struct CapturedEvent {
    target: String,
    level: tracing::Level,
    fields: HashMap<String, String>,
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            target: event.metadata().target().to_string(),
            level: *event.metadata().level(),
            fields: visitor.0.into_iter().collect(),
        });
    }
}

fn with_capture(f: impl FnOnce()) -> Vec<CapturedEvent> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::TRACE)
        .with(EventCapture {
            events: Arc::clone(&events),
        });
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

#[test]
fn assertion_failure_logs_a_warning_trip() {
    let events = with_capture(|| {
        let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
        director.start().assert_mode("result");
        director.stop();
    });

    let trip = events
        .iter()
        .find(|e| e.target == "stagehand.trip")
        .unwrap();
    assert_eq!(trip.level, tracing::Level::WARN);
    assert_eq!(trip.fields["kind"], "assertion");
    assert_eq!(trip.fields["component"], "stage_director");
}

#[test]
fn ignored_mutator_logs_the_setting() {
    let events = with_capture(|| {
        let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
        director.start().with_timeout(Duration::from_secs(1));
        director.stop();
    });

    let warning = events
        .iter()
        .find(|e| e.target == "stagehand.director" && e.level == tracing::Level::WARN)
        .unwrap();
    assert_eq!(warning.fields["setting"], "timeout");
}

#[test]
fn lifecycle_transitions_log_at_info() {
    let events = with_capture(|| {
        let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
        director.start().type_text("a");
        director.stop();
    });

    let info: Vec<_> = events
        .iter()
        .filter(|e| e.target == "stagehand.director" && e.level == tracing::Level::INFO)
        .map(|e| e.fields["message"].as_str())
        .collect();
    assert_eq!(info, ["stage started", "stage stopped"]);
    let stopped = events
        .iter()
        .find(|e| e.fields.get("message").is_some_and(|m| m == "stage stopped"))
        .unwrap();
    assert_eq!(stopped.fields["success"], "true");
}
