//! End-to-end fluent scenarios against well-behaved models.

mod common;

use std::time::{Duration, Instant};

use common::{DelayedResultsRepl, MockRepl, SimpleRepl, fast_config};
use stagehand::{ActionKind, ActionResult, StageDirector};

#[test]
fn initial_typing_result_scenario() {
    let mut director = StageDirector::with_config(MockRepl::default(), fast_config());
    director
        .start()
        .assert_mode("initial")
        .type_text("world")
        .assert_mode("typing")
        .press_enter()
        .wait_for_mode("result")
        .assert_view_contains("world");
    let result = director.stop();

    assert!(result.success, "unexpected failure: {}", result.error_message);
    assert!(result.actions.len() >= 7);
    assert!(result.error_message.is_empty());
    assert!(result.error.is_none());
    assert!(result.duration > Duration::ZERO);
    assert!(result.actions.iter().all(|a| a.result == ActionResult::Ok));
}

#[test]
fn greeting_round_trip() {
    let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
    director
        .start()
        .type_text("Ada")
        .assert_input_equals("Ada")
        .press_enter()
        .wait_for_text("Hello, Ada! You entered: Ada")
        .assert_mode("result")
        .assert_input_equals("");
    let result = director.stop();

    assert!(result.success, "unexpected failure: {}", result.error_message);
    let keypresses: Vec<_> = result
        .actions
        .iter()
        .filter(|a| a.kind == ActionKind::Keypress)
        .map(|a| a.details.as_str())
        .collect();
    assert_eq!(keypresses, ["enter"]);
}

#[test]
fn clear_input_removes_every_character() {
    let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
    director
        .start()
        .type_text("draft")
        .clear_input()
        .assert_input_equals("");
    assert_eq!(
        director
            .actions()
            .iter()
            .filter(|a| a.details == "backspace")
            .count(),
        5
    );
    assert!(director.stop().success);
}

#[test]
fn arrow_up_recalls_history() {
    let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
    director
        .start()
        .type_text("first")
        .press_enter()
        .press_arrow_up()
        .assert_input_equals("first")
        .press_escape()
        .assert_mode("input")
        .press_tab()
        .press_arrow_down();
    let result = director.stop();

    assert!(result.success, "unexpected failure: {}", result.error_message);
    let keys: Vec<_> = result
        .actions
        .iter()
        .filter(|a| a.kind == ActionKind::Keypress)
        .map(|a| a.details.as_str())
        .collect();
    assert_eq!(keys, ["enter", "up", "escape", "tab", "down"]);
}

#[test]
fn delayed_search_results_are_awaited() {
    let mut director = StageDirector::with_config(DelayedResultsRepl::default(), fast_config());
    director
        .start()
        .assert_no_search_results()
        .type_text("main")
        .press_enter()
        .wait_for_search_results()
        .assert_view_contains("Found 2 matches")
        .assert_condition("search_results")
        .wait_for_condition("search_results");
    let result = director.stop();

    assert!(result.success, "unexpected failure: {}", result.error_message);
    assert!(
        result
            .actions
            .iter()
            .any(|a| a.kind == ActionKind::Wait && a.details == "search_results")
    );
}

#[test]
fn assert_no_search_results_fails_once_results_show() {
    let mut director = StageDirector::with_config(DelayedResultsRepl::default(), fast_config());
    director
        .start()
        .type_text("lib")
        .press_enter()
        .wait_for_mode("results")
        .assert_no_search_results();
    let result = director.stop();

    assert!(!result.success);
    assert!(result.error_message.starts_with("[assertion]"));
}

#[test]
fn plain_wait_records_action_without_touching_program() {
    let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
    director.start();
    let before = director.sync_stats().updates_generated;

    let started = Instant::now();
    director.wait(Duration::from_millis(40));
    assert!(started.elapsed() >= Duration::from_millis(40));

    assert_eq!(director.sync_stats().updates_generated, before);
    let last = director.actions().pop().unwrap();
    assert_eq!(last.kind, ActionKind::Wait);
    assert_eq!(last.details, "40ms");
    director.stop();
}

#[test]
fn snapshots_follow_capture_setting() {
    let mut capturing = StageDirector::with_config(SimpleRepl::default(), fast_config());
    capturing.start().type_text("ab");
    assert_eq!(capturing.latest_snapshot().input, "ab");
    let with_views = capturing.stop();
    // initial + one per keystroke + final
    assert_eq!(with_views.snapshots.len(), 4);
    assert_eq!(with_views.snapshots[0].mode, "input");

    let mut quiet = StageDirector::with_config(SimpleRepl::default(), fast_config());
    quiet.with_view_capture(false).start().type_text("ab");
    assert_eq!(quiet.latest_snapshot().view, "");
    assert!(quiet.stop().snapshots.is_empty());
}

#[test]
fn synchronization_stats_report_every_counter() {
    let mut director = StageDirector::with_config(SimpleRepl::default(), fast_config());
    director.start().type_text("xyz");
    let stats = director.synchronization_stats();
    let keys: Vec<_> = stats.keys().copied().collect();
    assert_eq!(
        keys,
        [
            "buffer_capacity",
            "buffer_length",
            "buffer_overflows",
            "duplicate_updates",
            "sequence_gaps",
            "updates_dropped",
            "updates_generated",
            "updates_processed",
            "updates_sent",
        ]
    );
    assert_eq!(stats["buffer_capacity"], 50);
    // init + three keystrokes
    assert_eq!(stats["updates_generated"], 4);
    assert!(!director.has_dropped_updates());
    assert!(director.buffer_utilization() <= 100.0);

    let result = director.stop();
    assert_eq!(result.sync_stats.updates_processed, 4);
}
