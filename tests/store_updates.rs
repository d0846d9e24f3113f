use coalesce::{ManualScheduler, MemoryStore};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn concurrent_updates_collapse_to_one_cycle() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = MemoryStore::new(scheduler.clone());
    let done = Arc::new(AtomicUsize::new(0));
    let patches = [
        json!({"foo": 20}),
        json!({"bar": "asdf"}),
        json!({"baz": true}),
    ];
    for patch in patches {
        let done = Arc::clone(&done);
        store
            .update("beau", patch, move |saved| {
                assert_eq!(saved["foo"], 20);
                assert_eq!(saved["bar"], "asdf");
                assert_eq!(saved["baz"], true);
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.run_next_turn();
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert_eq!(
        store.get("beau"),
        Some(json!({"foo": 20, "bar": "asdf", "baz": true}))
    );
    // One read-modify-write cycle for the whole burst.
    assert_eq!(store.aggregator().telemetry().batches_flushed(), 1);
}

#[test]
fn updates_to_different_keys_stay_independent() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = MemoryStore::new(scheduler.clone());
    let done = Arc::new(AtomicUsize::new(0));
    let updates = [
        ("meow", json!({"hi": "there"})),
        ("beau", json!({"foo": 20})),
        ("meow", json!({"hello": "you"})),
        ("beau", json!({"bar": "asdf"})),
        ("meow", json!({"herp": "derp"})),
    ];
    for (key, patch) in updates {
        let done = Arc::clone(&done);
        store
            .update(key, patch, move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.run_next_turn();
    assert_eq!(done.load(Ordering::SeqCst), 5);
    assert_eq!(
        store.get("meow"),
        Some(json!({"hi": "there", "hello": "you", "herp": "derp"}))
    );
    assert_eq!(store.get("beau"), Some(json!({"foo": 20, "bar": "asdf"})));
    assert_eq!(store.aggregator().telemetry().batches_flushed(), 2);
}

#[test]
fn merged_patch_overwrites_existing_fields() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = MemoryStore::new(scheduler.clone());
    store
        .update("doc", json!({"version": 1, "kept": "yes"}), |_| {})
        .unwrap();
    scheduler.run_next_turn();
    store.update("doc", json!({"version": 2}), |_| {}).unwrap();
    scheduler.run_next_turn();
    assert_eq!(store.get("doc"), Some(json!({"version": 2, "kept": "yes"})));
}

#[test]
fn unbatched_updates_overwrite_each_other() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = MemoryStore::new(scheduler.clone());
    let done = Arc::new(AtomicUsize::new(0));
    for patch in [json!({"a": 1}), json!({"b": 2})] {
        let done = Arc::clone(&done);
        store.update_unbatched("bad", patch, move || {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    scheduler.run_next_turn();
    assert_eq!(done.load(Ordering::SeqCst), 2);
    // Both callers loaded the empty value before either saved, so the last
    // writer's field is all that survives.
    assert_eq!(store.get("bad"), Some(json!({"b": 2})));
}
