//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and state work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_reactive::{
    Cleanup, ComputedState, Effect, Origin, ReactiveError, Runtime, RuntimeConfig, State,
};
use serde_json::{json, Value};

fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    (count, move || count_clone.set(count_clone.get() + 1))
}

/// A subscriber sees only actual changes.
#[test]
fn subscriber_logs_distinct_values() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    {
        let (reader, log) = (signal.clone(), log.clone());
        signal.subscribe(move || log.borrow_mut().push(reader.get()));
    }

    signal.set(1);
    signal.set(1);
    signal.set(2);

    assert_eq!(*log.borrow(), vec![1, 2]);
}

/// A computed runs once per invalidation, and only when read.
#[test]
fn computed_recomputes_once_per_change() {
    let rt = Runtime::new();
    let n = rt.create_signal(2);
    let (calls, bump) = counter();

    let c = rt.create_computed({
        let n = n.clone();
        move || {
            bump();
            n.get() * 2
        }
    });

    let mut results = vec![c.get(), c.get()];
    n.set(5);
    assert_eq!(calls.get(), 1);
    results.push(c.get());

    assert_eq!(results, vec![4, 4, 10]);
    assert_eq!(calls.get(), 2);
}

/// Get after creation returns the initial value; get after set returns the
/// most recent value.
#[test]
fn signal_reads_latest_value() {
    let rt = Runtime::new();
    let signal = rt.create_signal(String::from("initial"));
    assert_eq!(signal.get(), "initial");

    for value in ["a", "b", "a", "c"] {
        signal.set(value.to_string());
        assert_eq!(signal.get(), value);
    }
}

/// After unsubscribing, the callback never runs again.
#[test]
fn unsubscribed_callback_stays_silent() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let (calls, bump) = counter();

    let mut subscription = signal.subscribe(bump);
    signal.set(1);
    subscription.unsubscribe();
    subscription.unsubscribe();
    for i in 2..10 {
        signal.set(i);
    }

    assert_eq!(calls.get(), 1);
    assert!(!subscription.is_active());
}

/// An effect runs once on creation and once per change, with the previous
/// cleanup running before the new body.
#[test]
fn effect_reruns_after_cleanup() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let effect = rt.create_effect({
        let (signal, log) = (signal.clone(), log.clone());
        move || {
            let value = signal.get();
            log.borrow_mut().push(format!("run {value}"));
            let log = log.clone();
            Cleanup::new(move || log.borrow_mut().push(format!("cleanup {value}")))
        }
    });
    assert_eq!(*log.borrow(), vec!["run 0"]);

    signal.set(1);
    assert_eq!(*log.borrow(), vec!["run 0", "cleanup 0", "run 1"]);
    assert_eq!(effect.run_count(), 2);
}

/// A disposed effect never runs again and mutations do not fail.
#[test]
fn disposed_effect_does_not_run() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let (runs, bump) = counter();

    let effect = rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump();
        }
    });
    assert_eq!(runs.get(), 1);

    effect.dispose();
    signal.set(1);
    signal.set(2);
    effect.dispose();

    assert_eq!(runs.get(), 1);
    assert_eq!(signal.subscriber_count(), 0);
    assert!(rt.take_errors().is_empty());
}

/// Dependencies follow the branch taken by the latest run.
#[test]
fn effect_dependencies_are_dynamic() {
    let rt = Runtime::new();
    let flag = rt.create_signal(true);
    let a = rt.create_signal(1);
    let b = rt.create_signal(10);
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.create_effect({
        let (flag, a, b, seen) = (flag.clone(), a.clone(), b.clone(), seen.clone());
        move || {
            let value = if flag.get() { a.get() } else { b.get() };
            seen.borrow_mut().push(value);
        }
    });

    b.set(11);
    assert_eq!(*seen.borrow(), vec![1]);

    flag.set(false);
    a.set(2);
    b.set(12);
    assert_eq!(*seen.borrow(), vec![1, 11, 12]);
    assert_eq!(a.subscriber_count(), 0);
}

/// An effect reading a signal and a computed of it runs once per change and
/// never sees a stale computed.
#[test]
fn effect_sees_fresh_computed() {
    let rt = Runtime::new();
    let count = rt.create_signal(1);
    let doubled = rt.create_computed({
        let count = count.clone();
        move || count.get() * 2
    });
    let log = Rc::new(RefCell::new(Vec::new()));

    rt.create_effect({
        let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
        move || log.borrow_mut().push((count.get(), doubled.get()))
    });

    count.set(2);
    count.set(3);
    assert_eq!(*log.borrow(), vec![(1, 2), (2, 4), (3, 6)]);
}

/// Changes travel through a chain of computeds into an effect.
#[test]
fn computed_chain_drives_effect() {
    let rt = Runtime::new();
    let base = rt.create_signal(5);
    let doubled = rt.create_computed({
        let base = base.clone();
        move || base.get() * 2
    });
    let plus_ten = rt.create_computed({
        let doubled = doubled.clone();
        move || doubled.get() + 10
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.create_effect({
        let (plus_ten, seen) = (plus_ten.clone(), seen.clone());
        move || seen.borrow_mut().push(plus_ten.get())
    });

    base.set(10);
    assert_eq!(*seen.borrow(), vec![20, 30]);
    assert_eq!(doubled.state(), ComputedState::Clean);
}

/// An effect over a failing computed keeps updating once the input
/// recovers.
#[test]
fn effect_recovers_after_computed_failure() {
    let rt = Runtime::with_config(RuntimeConfig {
        log_reports: false,
        ..RuntimeConfig::default()
    });
    let n = rt.create_signal(1);
    let c = rt.create_computed({
        let n = n.clone();
        move || {
            let value = n.get();
            if value >= 10 {
                panic!("too large");
            }
            value
        }
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.create_effect({
        let (c, seen) = (c.clone(), seen.clone());
        move || seen.borrow_mut().push(c.try_get().ok())
    });

    n.set(10);
    n.set(3);

    assert_eq!(*seen.borrow(), vec![Some(1), Some(1), Some(3)]);
    assert_eq!(c.get_untracked(), Ok(3));
    let errors = rt.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].origin, Origin::Computed);
}

/// An effect disposed by a peer during a notification pass does not run in
/// that pass.
#[test]
fn effect_disposed_mid_pass_is_skipped() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let (runs, bump) = counter();
    let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

    rt.create_effect({
        let (signal, victim) = (signal.clone(), victim.clone());
        move || {
            if signal.get() > 0 {
                if let Some(effect) = victim.borrow().as_ref() {
                    effect.dispose();
                }
            }
        }
    });
    let second = rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump();
        }
    });
    *victim.borrow_mut() = Some(second.clone());

    signal.set(1);
    signal.set(2);

    assert_eq!(runs.get(), 1);
    assert!(second.is_disposed());
    assert_eq!(signal.subscriber_count(), 1);
}

/// A computed that is not read stays dirty however often its input changes.
#[test]
fn unread_computed_never_recomputes() {
    let rt = Runtime::new();
    let n = rt.create_signal(0);
    let (calls, bump) = counter();
    let c = rt.create_computed({
        let n = n.clone();
        move || {
            bump();
            n.get()
        }
    });

    c.get();
    for i in 1..20 {
        n.set(i);
    }
    assert_eq!(calls.get(), 1);
    assert_eq!(c.state(), ComputedState::Dirty);
    assert_eq!(c.get(), 19);
    assert_eq!(calls.get(), 2);
}

/// An effect that writes what it reads settles once the value stops
/// changing.
#[test]
fn self_writing_effect_settles() {
    let rt = Runtime::new();
    let n = rt.create_signal(0);

    let effect = rt.create_effect({
        let n = n.clone();
        move || {
            let value = n.get();
            if value < 5 {
                n.set(value + 1);
            }
        }
    });

    assert_eq!(n.get(), 5);
    assert!(effect.run_count() >= 6);
}

/// A failing effect does not disturb its peers or the writer.
#[test]
fn failing_effect_is_isolated() {
    let rt = Runtime::with_config(RuntimeConfig {
        log_reports: false,
        ..RuntimeConfig::default()
    });
    let signal = rt.create_signal(0);
    let (runs, bump) = counter();

    let failing = rt.create_effect({
        let signal = signal.clone();
        move || {
            if signal.get() == 1 {
                panic!("cannot handle one");
            }
        }
    });
    rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump();
        }
    });

    assert_eq!(signal.set(1), 1);
    assert_eq!(runs.get(), 2);

    let errors = rt.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].origin, Origin::Effect);
    assert_eq!(errors[0].runner, Some(failing.id()));
    assert_eq!(errors[0].message, "cannot handle one");

    // Still subscribed after the failure.
    signal.set(2);
    assert_eq!(failing.run_count(), 3);
    assert!(rt.take_errors().is_empty());
}

/// Writing a state key re-runs its readers; writing it again does nothing.
#[test]
fn state_key_write_reruns_effect() {
    let rt = Runtime::new();
    let state = State::from_json(&rt, json!({ "x": 0 })).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (listener_calls, bump) = counter();
    state.subscribe(move |_, _, _| bump());

    let effect = rt.create_effect({
        let (state, seen) = (state.clone(), seen.clone());
        move || seen.borrow_mut().push(state.get("x"))
    });

    state.set("x", json!(1)).unwrap();
    state.set("x", json!(1)).unwrap();

    assert_eq!(*seen.borrow(), vec![Some(json!(0)), Some(json!(1))]);
    assert_eq!(effect.run_count(), 2);
    assert_eq!(listener_calls.get(), 1);
}

/// Deleting a key notifies listeners once with no new value.
#[test]
fn state_delete_notifies_once() {
    let rt = Runtime::new();
    let state = State::from_json(&rt, json!({ "x": "old" })).unwrap();
    let changes: Rc<RefCell<Vec<(String, Option<Value>, Option<Value>)>>> =
        Rc::new(RefCell::new(Vec::new()));

    {
        let changes = changes.clone();
        state.subscribe(move |key, old, new| {
            changes
                .borrow_mut()
                .push((key.to_string(), old.cloned(), new.cloned()));
        });
    }

    assert_eq!(state.delete("x"), Ok(true));
    assert_eq!(state.delete("x"), Ok(false));

    assert_eq!(
        *changes.borrow(),
        vec![("x".to_string(), Some(json!("old")), None)]
    );
    assert_eq!(state.to_json(), json!({}));
}

/// A computed over state keys follows writes and deletes.
#[test]
fn computed_over_state() {
    let rt = Runtime::new();
    let state = State::from_json(&rt, json!({ "a": 1, "b": 2 })).unwrap();
    let sum = rt.create_computed({
        let state = state.clone();
        move || {
            ["a", "b"]
                .iter()
                .filter_map(|key| state.get(key))
                .filter_map(|value| value.as_i64())
                .sum::<i64>()
        }
    });

    assert_eq!(sum.get(), 3);
    state.set("a", json!(10)).unwrap();
    assert_eq!(sum.get(), 12);
    state.delete("b").unwrap();
    assert_eq!(sum.get(), 10);
    state.set("b", json!(5)).unwrap();
    assert_eq!(sum.get(), 15);
}

/// Reserved keys and non-object records are rejected.
#[test]
fn state_rejects_invalid_input() {
    let rt = Runtime::new();
    assert!(matches!(
        State::from_json(&rt, json!("text")),
        Err(ReactiveError::NotAnObject { .. })
    ));

    let state = State::from_json(&rt, json!({})).unwrap();
    assert_eq!(
        state.set("subscribe", json!(1)),
        Err(ReactiveError::ReservedKey("subscribe".into()))
    );
    assert_eq!(state.get("inspect"), None);
}

/// Separate runtimes never see each other's reads.
#[test]
fn runtimes_are_isolated() {
    let first = Runtime::new();
    let second = Runtime::new();
    let signal = first.create_signal(0);
    let (runs, bump) = counter();

    // Reads of a signal from another runtime are not attributed to this
    // runtime's runner.
    let effect = second.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump();
        }
    });

    signal.set(1);
    assert_eq!(runs.get(), 1);
    assert_eq!(effect.dependency_count(), 0);
    assert_eq!(first.runner_count(), 0);
    assert_eq!(second.source_count(), 0);
    assert!(!first.ptr_eq(&second));
}

/// Disposing the runtime stops every effect and releases what they held.
#[test]
fn runtime_dispose_stops_effects() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);
    let (runs, bump) = counter();

    let effects: Vec<_> = (0..3)
        .map(|_| {
            let (signal, bump) = (signal.clone(), bump.clone());
            rt.create_effect(move || {
                signal.get();
                bump();
            })
        })
        .collect();
    assert_eq!(runs.get(), 3);

    rt.dispose();
    signal.set(1);

    assert_eq!(runs.get(), 3);
    assert!(effects.iter().all(|effect| effect.is_disposed()));
    assert_eq!(rt.runner_count(), 0);
}

/// Configuration loads from JSON with defaults for missing fields.
#[test]
fn runtime_config_from_json() {
    let config = RuntimeConfig::from_json_str(r#"{ "retained_errors": 1 }"#).unwrap();
    assert_eq!(config.retained_errors, 1);
    assert!(config.log_reports);

    let rt = Runtime::with_config(config);
    let signal = rt.create_signal(0);
    signal.subscribe(|| panic!("first"));
    signal.subscribe(|| panic!("second"));
    signal.set(1);

    let errors = rt.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "second");
}
