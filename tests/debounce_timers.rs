use coalesce::{AggregateOptions, Aggregator, ManualScheduler};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn json_aggregator() -> (Arc<ManualScheduler>, Arc<Aggregator<Value>>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let aggregator = Arc::new(Aggregator::new(scheduler.clone()));
    (scheduler, aggregator)
}

fn counting_submit(
    aggregator: &Arc<Aggregator<Value>>,
    namespace: &str,
    payload: Value,
    options: &AggregateOptions<Value>,
    results: &Arc<Mutex<Vec<Value>>>,
) {
    let sink = Arc::clone(results);
    aggregator
        .submit(namespace, payload, options.clone(), move |merged| {
            sink.lock().unwrap().push((*merged).clone());
        })
        .unwrap();
}

#[test]
fn zero_duration_flush_defers_to_next_turn() {
    let (scheduler, aggregator) = json_aggregator();
    let results = Arc::new(Mutex::new(Vec::new()));
    counting_submit(
        &aggregator,
        "deferred",
        json!({"a": 1}),
        &AggregateOptions::default(),
        &results,
    );
    assert!(results.lock().unwrap().is_empty());
    assert_eq!(scheduler.run_next_turn(), 1);
    assert_eq!(*results.lock().unwrap(), vec![json!({"a": 1})]);
    // Nothing left armed once the batch has flushed.
    assert_eq!(scheduler.run_next_turn(), 0);
}

#[test]
fn fixed_delay_ignores_later_submissions() {
    let (scheduler, aggregator) = json_aggregator();
    let options = AggregateOptions::default().with_duration(Duration::from_millis(60));
    let results = Arc::new(Mutex::new(Vec::new()));

    counting_submit(&aggregator, "window", json!({"d": "d"}), &options, &results);
    scheduler.advance(Duration::from_millis(30));
    counting_submit(&aggregator, "window", json!({"a": "a"}), &options, &results);
    // 50 ms after the first submission: the window is still open.
    scheduler.advance(Duration::from_millis(20));
    assert!(results.lock().unwrap().is_empty());
    // 60 ms after the first submission the batch closes, regardless of the
    // later arrival.
    scheduler.advance(Duration::from_millis(10));
    let seen = results.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|value| value == &json!({"a": "a", "d": "d"})));
    assert_eq!(aggregator.telemetry().timers_rearmed(), 0);
}

#[test]
fn debounce_resets_countdown_from_last_submission() {
    let (scheduler, aggregator) = json_aggregator();
    let options = AggregateOptions::default()
        .with_duration(Duration::from_millis(30))
        .with_debounce(true);
    let results = Arc::new(Mutex::new(Vec::new()));

    counting_submit(&aggregator, "typed", json!({"d": "d"}), &options, &results);
    scheduler.advance(Duration::from_millis(20));
    counting_submit(&aggregator, "typed", json!({"a": "a"}), &options, &results);
    scheduler.advance(Duration::from_millis(20));
    counting_submit(&aggregator, "typed", json!({"b": "b"}), &options, &results);
    scheduler.advance(Duration::from_millis(20));
    counting_submit(&aggregator, "typed", json!({"c": "c"}), &options, &results);

    // 20 ms after the last submission: still within the debounce window.
    scheduler.advance(Duration::from_millis(20));
    assert!(results.lock().unwrap().is_empty());
    // 30 ms after the last submission the batch finally closes.
    scheduler.advance(Duration::from_millis(10));
    let seen = results.lock().unwrap();
    assert_eq!(seen.len(), 4);
    let expected = json!({"a": "a", "b": "b", "c": "c", "d": "d"});
    assert!(seen.iter().all(|value| value == &expected));
    drop(seen);
    assert_eq!(aggregator.telemetry().timers_rearmed(), 3);
    assert_eq!(aggregator.telemetry().batches_flushed(), 1);
}

#[test]
fn zero_duration_debounce_rearms_within_turn() {
    let (scheduler, aggregator) = json_aggregator();
    let options = AggregateOptions::default().with_debounce(true);
    let delivered = Arc::new(AtomicUsize::new(0));
    for payload in [json!({"a": 1}), json!({"b": 2}), json!({"c": 3})] {
        let delivered = Arc::clone(&delivered);
        aggregator
            .submit("rapid", payload, options.clone(), move |merged| {
                assert_eq!(*merged, json!({"a": 1, "b": 2, "c": 3}));
                delivered.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.run_next_turn();
    // Two superseded fires were cancelled; only the latest one flushed.
    assert_eq!(delivered.load(Ordering::SeqCst), 3);
    assert_eq!(aggregator.telemetry().batches_flushed(), 1);
    assert_eq!(aggregator.telemetry().timers_rearmed(), 2);
}

#[test]
fn stale_fire_after_rearm_is_ignored() {
    let (scheduler, aggregator) = json_aggregator();
    let options = AggregateOptions::default()
        .with_duration(Duration::from_millis(10))
        .with_debounce(true);
    let results = Arc::new(Mutex::new(Vec::new()));
    counting_submit(&aggregator, "race", json!({"a": 1}), &options, &results);
    counting_submit(&aggregator, "race", json!({"b": 2}), &options, &results);
    // Both timers are past due; only the rearmed one may flush.
    scheduler.advance(Duration::from_millis(10));
    assert_eq!(results.lock().unwrap().len(), 2);
    assert_eq!(aggregator.telemetry().batches_flushed(), 1);
}
