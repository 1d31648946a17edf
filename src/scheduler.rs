// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Greedy scheduler (spec §4.4): contexts are partitioned into regions
//! keyed by `(op_type, mode, numa_id)`; `pick_next` rotates within a
//! region with opportunistic non-blocking locking, falling back across
//! NUMA nodes and finally to a blocking acquire.
//!
//! The original's cumulative-sum "global index" bookkeeping is replaced
//! here by the typed `CtxHandle` plus a direct reverse index from handle
//! to `(region, offset)` (§9 redesign flags: typed handles resolved
//! through a table; this crate resolves the open question of whether
//! `put_ctx` needs a direct index by building one, see DESIGN.md).

use std::{
    collections::HashMap,
    sync::{Mutex, atomic::{AtomicUsize, Ordering}},
};

use crate::{
    cfg::enums::{Mode, OpType},
    context::{Context, ContextTable, CtxHandle},
    error::WdError,
};

pub const MAX_POLL_ROUNDS: usize = 1000;

/// The selection key a session carries (§4.4): which region `pick_next`
/// should route into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedKey {
    pub op_type: OpType,
    pub mode: Mode,
    pub numa_id: u8,
}

/// Capability trait the dispatch layer routes through (§9: v-table →
/// trait). `H` is the queue driver's context handle type, threaded
/// through so `poll_policy` can hand dispatch's `poll_ctx` a resolved
/// [`Context`] without the scheduler needing to know the driver trait.
pub trait Scheduler<H> {
    fn pick_next(&self, table: &ContextTable<H>, key: SchedKey) -> Result<CtxHandle, WdError>;
    fn put_ctx(&self, handle: CtxHandle);

    /// Sweeps every async region, calling `poll_one` for each context in
    /// `(type, numa, offset)` nesting, up to `MAX_POLL_ROUNDS` full
    /// sweeps or until `count >= expect`. `poll_one` returns the number
    /// of completions it drained for that one context, or
    /// `Err(WdError::Again)` to mean "nothing this round" (not
    /// propagated), or any other error to abort the sweep immediately.
    fn poll_policy(
        &self,
        expect: usize,
        poll_one: &mut dyn FnMut(CtxHandle) -> Result<usize, WdError>,
    ) -> Result<usize, WdError>;
}

struct Region {
    key: SchedKey,
    ctxs: Vec<CtxHandle>,
    last: AtomicUsize,
    rotation: Mutex<()>,
}

/// Greedy scheduler instance bound to one context table (spec §4.4).
pub struct GreedyScheduler {
    numa_num: u8,
    regions: Vec<Region>,
    region_of_key: HashMap<SchedKey, usize>,
    /// Reverse index from a bound context back to its region/offset, so
    /// `put_ctx` resolves in O(1) instead of a linear region scan.
    owner_of: HashMap<CtxHandle, (usize, usize)>,
}

impl GreedyScheduler {
    fn region_index(&self, key: SchedKey) -> Option<usize> {
        self.region_of_key.get(&key).copied()
    }

    fn try_rotate_non_blocking<H>(&self, table: &ContextTable<H>, region_idx: usize) -> Option<CtxHandle> {
        let region = &self.regions[region_idx];
        let _rotation_guard = region.rotation.lock().expect("rotation mutex poisoned");
        let n = region.ctxs.len();
        if n == 0 {
            return None;
        }
        let last = region.last.load(Ordering::Relaxed);
        for i in 1..=n {
            let offset = (last + i) % n;
            let handle = region.ctxs[offset];
            let Some(ctx) = table.get(handle) else { continue };
            if let Ok(guard) = ctx.lock.try_lock() {
                drop(guard);
                region.last.store(offset, Ordering::Relaxed);
                return Some(handle);
            }
        }
        None
    }

    fn blocking_fallback<H>(&self, table: &ContextTable<H>, region_idx: usize) -> Option<CtxHandle> {
        let region = &self.regions[region_idx];
        let _rotation_guard = region.rotation.lock().expect("rotation mutex poisoned");
        let n = region.ctxs.len();
        if n == 0 {
            return None;
        }
        let last = region.last.load(Ordering::Relaxed);
        let offset = (last + 1) % n;
        let handle = region.ctxs[offset];
        if let Some(ctx) = table.get(handle) {
            let guard = ctx.lock.lock().expect("context mutex poisoned");
            drop(guard);
        }
        region.last.store(offset, Ordering::Relaxed);
        Some(handle)
    }
}

impl<H> Scheduler<H> for GreedyScheduler {
    fn pick_next(&self, table: &ContextTable<H>, key: SchedKey) -> Result<CtxHandle, WdError> {
        if let Some(region_idx) = self.region_index(key)
            && !self.regions[region_idx].ctxs.is_empty()
        {
            if let Some(handle) = self.try_rotate_non_blocking(table, region_idx) {
                return Ok(handle);
            }
            if let Some(handle) = self.blocking_fallback(table, region_idx) {
                return Ok(handle);
            }
        }

        // NUMA fallback: try every node 0..N for a non-empty region with
        // the same (op_type, mode), in order (§4.4 step 2).
        for numa_id in 0..self.numa_num {
            let fallback_key = SchedKey { op_type: key.op_type, mode: key.mode, numa_id };
            if let Some(region_idx) = self.region_index(fallback_key)
                && !self.regions[region_idx].ctxs.is_empty()
            {
                if let Some(handle) = self.try_rotate_non_blocking(table, region_idx) {
                    return Ok(handle);
                }
                if let Some(handle) = self.blocking_fallback(table, region_idx) {
                    return Ok(handle);
                }
            }
        }

        Err(WdError::InvalidSchedule(key))
    }

    fn put_ctx(&self, handle: CtxHandle) {
        // Releasing here is a no-op beyond bookkeeping: `pick_next` only
        // ever probes a context's lock and releases it immediately, so
        // the actual send/recv critical section lock is acquired and
        // released by the dispatch layer itself (§4.5 steps 4/7). This
        // reverse lookup exists so a future caller-visible `put_ctx` (or
        // diagnostics) can resolve a handle's owning region in O(1).
        let _ = self.owner_of.get(&handle);
    }

    fn poll_policy(
        &self,
        expect: usize,
        poll_one: &mut dyn FnMut(CtxHandle) -> Result<usize, WdError>,
    ) -> Result<usize, WdError> {
        let mut count = 0usize;
        for _round in 0..MAX_POLL_ROUNDS {
            if count >= expect {
                break;
            }
            let mut any_async = false;
            for region in &self.regions {
                if region.key.mode != Mode::Async {
                    continue;
                }
                any_async = true;
                for &handle in &region.ctxs {
                    match poll_one(handle) {
                        Ok(n) => count += n,
                        Err(WdError::Again) => continue,
                        Err(e) => return Err(e),
                    }
                    if count >= expect {
                        return Ok(count);
                    }
                }
            }
            if !any_async {
                break;
            }
        }
        Ok(count)
    }
}

/// Canonical region enumeration order: every `(op_type, mode, numa_id)`
/// combination for `numa_num` nodes, all initially empty.
fn canonical_keys(numa_num: u8) -> Vec<SchedKey> {
    let op_types = [OpType::Compress, OpType::Decompress, OpType::CipherEncrypt, OpType::CipherDecrypt];
    let modes = [Mode::Sync, Mode::Async];
    let mut keys = Vec::with_capacity(op_types.len() * modes.len() * numa_num as usize);
    for &op_type in &op_types {
        for &mode in &modes {
            for numa_id in 0..numa_num {
                keys.push(SchedKey { op_type, mode, numa_id });
            }
        }
    }
    keys
}

/// Allocates a fresh Greedy scheduler with one empty region per
/// `(op_type, mode, numa_id)` combination across `numa_num` nodes.
pub fn greedy_alloc(numa_num: u8) -> GreedyScheduler {
    let keys = canonical_keys(numa_num);
    let mut region_of_key = HashMap::with_capacity(keys.len());
    let regions = keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            region_of_key.insert(key, i);
            Region { key, ctxs: Vec::new(), last: AtomicUsize::new(0), rotation: Mutex::new(()) }
        })
        .collect();
    GreedyScheduler { numa_num, regions, region_of_key, owner_of: HashMap::new() }
}

/// Binds one context into its region, per `(ctx.op_type, ctx.mode,
/// ctx.numa_id)` (spec §4.4's region fill, modeled on
/// `sched_greedy_bind_ctx`).
pub fn greedy_bind_ctx<H>(sched: &mut GreedyScheduler, handle: CtxHandle, ctx: &Context<H>) -> Result<(), WdError> {
    let key = SchedKey { op_type: ctx.op_type, mode: ctx.mode, numa_id: ctx.numa_id };
    let region_idx = sched
        .region_index(key)
        .ok_or_else(|| WdError::InvalidParam(format!("numa_id {} out of range", ctx.numa_id)))?;
    let offset = sched.regions[region_idx].ctxs.len();
    sched.regions[region_idx].ctxs.push(handle);
    sched.owner_of.insert(handle, (region_idx, offset));
    Ok(())
}

/// Tears down a scheduler's bookkeeping. Queue-pair teardown itself is
/// the driver's responsibility (§4.8); this only drops region state.
pub fn greedy_free(sched: GreedyScheduler) {
    drop(sched);
}
