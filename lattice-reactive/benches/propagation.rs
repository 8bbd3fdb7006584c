//! Benchmarks for change propagation.
//!
//! Run with: `cargo bench --package lattice-reactive --bench propagation`

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_reactive::{Runtime, State};
use serde_json::json;

// ============================================================================
// Signals and Effects
// ============================================================================

/// One signal, `n` effects reading it.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for n in [1usize, 10, 100, 1000] {
        let rt = Runtime::new();
        let signal = rt.create_signal(0u64);
        let sink = Rc::new(Cell::new(0u64));
        for _ in 0..n {
            let (signal, sink) = (signal.clone(), sink.clone());
            rt.create_effect(move || sink.set(sink.get().wrapping_add(signal.get())));
        }

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                signal.set(black_box(value));
            });
        });
        rt.dispose();
    }

    group.finish();
}

/// A chain of `n` computeds ending in one effect.
fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for n in [1usize, 10, 100] {
        let rt = Runtime::new();
        let signal = rt.create_signal(0u64);
        let mut tail = {
            let signal = signal.clone();
            rt.create_computed(move || signal.get())
        };
        for _ in 1..n {
            let previous = tail.clone();
            tail = rt.create_computed(move || previous.get() + 1);
        }
        let sink = Rc::new(Cell::new(0u64));
        {
            let (tail, sink) = (tail.clone(), sink.clone());
            rt.create_effect(move || sink.set(tail.get()));
        }

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                signal.set(black_box(value));
                black_box(sink.get())
            });
        });
        rt.dispose();
    }

    group.finish();
}

/// Repeated reads of a clean computed.
fn bench_cached_read(c: &mut Criterion) {
    let rt = Runtime::new();
    let signal = rt.create_signal(21u64);
    let doubled = {
        let signal = signal.clone();
        rt.create_computed(move || signal.get() * 2)
    };

    c.bench_function("cached_read", |b| b.iter(|| black_box(doubled.get())));
}

// ============================================================================
// State
// ============================================================================

/// Writes to one key of a state with `n` keys, each read by its own effect.
fn bench_state_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_write");

    for n in [10usize, 100, 1000] {
        let rt = Runtime::new();
        let record: serde_json::Map<_, _> = (0..n).map(|i| (format!("k{i}"), json!(0))).collect();
        let state = State::from_json(&rt, serde_json::Value::Object(record))
            .expect("benchmark state is an object");
        for i in 0..n {
            let state = state.clone();
            let key = format!("k{i}");
            rt.create_effect(move || {
                black_box(state.get(&key));
            });
        }

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                state
                    .set("k0", json!(value))
                    .expect("k0 is not reserved");
            });
        });
        rt.dispose();
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_fan_out,
    bench_computed_chain,
    bench_cached_read,
    bench_state_write,
);

criterion_main!(benches);
