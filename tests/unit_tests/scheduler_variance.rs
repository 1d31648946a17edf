// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Invariant 4 from spec §8: the Greedy scheduler's rotation keeps the
//! per-context load spread over any window of `N` submissions bounded,
//! even when submitters race for the same region concurrently.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use wd_offload_rt::{
    Context, ContextTable, GreedyScheduler, SchedKey, Scheduler, greedy_bind_ctx,
    cfg::enums::{Mode, OpType},
};

fn build_region(n: usize) -> (ContextTable<()>, GreedyScheduler) {
    let key = SchedKey { op_type: OpType::Compress, mode: Mode::Sync, numa_id: 0 };
    let contexts: Vec<_> = (0..n).map(|_| Context::new(key.op_type, key.mode, key.numa_id, ())).collect();
    let table = ContextTable::new(contexts);
    let mut sched = wd_offload_rt::greedy_alloc(1);
    for (handle, ctx) in table.iter() {
        greedy_bind_ctx(&mut sched, handle, ctx).expect("bind ok");
    }
    (table, sched)
}

#[test]
fn pick_next_keeps_load_balanced_across_sequential_submissions() {
    const CONTEXTS: usize = 4;
    const ROUNDS: usize = 5;

    let (table, sched) = build_region(CONTEXTS);
    let key = SchedKey { op_type: OpType::Compress, mode: Mode::Sync, numa_id: 0 };

    let mut counts: HashMap<usize, usize> = HashMap::new();
    for _ in 0..CONTEXTS * ROUNDS {
        let handle = sched.pick_next(&table, key).expect("region non-empty");
        *counts.entry(handle.index()).or_insert(0) += 1;
    }

    assert_eq!(counts.len(), CONTEXTS, "every context must have been picked at least once");
    let min = *counts.values().min().expect("non-empty");
    let max = *counts.values().max().expect("non-empty");
    assert!(max - min <= 1, "load spread {min}..={max} exceeds the greedy rotation's bound");
}

#[test]
fn pick_next_keeps_load_balanced_under_concurrent_submitters() {
    const CONTEXTS: usize = 4;
    const PRODUCERS: usize = 16;
    const PICKS_PER_PRODUCER: usize = 20;

    let (table, sched) = build_region(CONTEXTS);
    let table = Arc::new(table);
    let sched = Arc::new(sched);
    let key = SchedKey { op_type: OpType::Compress, mode: Mode::Sync, numa_id: 0 };

    let counts: Arc<Mutex<HashMap<usize, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    std::thread::scope(|scope| {
        for _ in 0..PRODUCERS {
            let table = Arc::clone(&table);
            let sched = Arc::clone(&sched);
            let counts = Arc::clone(&counts);
            scope.spawn(move || {
                for _ in 0..PICKS_PER_PRODUCER {
                    let handle = sched.pick_next(&table, key).expect("region non-empty");
                    *counts.lock().expect("counts mutex poisoned").entry(handle.index()).or_insert(0) += 1;
                }
            });
        }
    });

    let counts = counts.lock().expect("counts mutex poisoned");
    let total: usize = counts.values().sum();
    assert_eq!(total, PRODUCERS * PICKS_PER_PRODUCER);
    assert_eq!(counts.len(), CONTEXTS, "every context must have received work");

    // Under full contention, the greedy region-rotation spreads load
    // roughly evenly; assert it stays within a small multiple of the
    // ideal per-context share rather than the tight sequential bound,
    // since concurrent probing can let one producer's `try_lock` miss
    // race ahead of another's.
    let ideal = total / CONTEXTS;
    let max = *counts.values().max().expect("non-empty");
    let min = *counts.values().min().expect("non-empty");
    assert!(max <= ideal * 2 + 1, "max count {max} far exceeds ideal share {ideal}");
    assert!(min > 0, "no context starved of work: {min}");
}
