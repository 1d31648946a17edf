// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Process-wide runtime singleton (spec §3 Global Runtime Settings, §4.8,
//! §9).
//!
//! A v-table-style global mutable struct becomes one `OnceCell`-guarded
//! value with an explicit `{Uninit, Init}` state (§9 redesign flags).
//! `init`/`uninit` serialize against *each other* through a write lock;
//! ordinary dispatch calls only ever take a read lock, so they never
//! contend with one another the way a single global mutex around every
//! call would (§5's per-context, not per-process, serialization model).

use std::sync::RwLock;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    cfg::config::Config,
    context::{Context, ContextTable, CtxHandle},
    error::WdError,
    message_pool::MessagePool,
    queue_driver::Driver,
    scheduler::{GreedyScheduler, greedy_alloc, greedy_bind_ctx, greedy_free},
    session::SessionTable,
};

enum State {
    Uninit,
    Init(Box<Runtime>),
}

static RUNTIME: OnceCell<RwLock<State>> = OnceCell::new();

fn cell() -> &'static RwLock<State> {
    RUNTIME.get_or_init(|| RwLock::new(State::Uninit))
}

/// Everything `init` assembles and `uninit` tears down: the context
/// table, each context's message pool, the session table, and the bound
/// scheduler/driver.
pub struct Runtime {
    pub contexts: ContextTable<usize>,
    pub pools: Vec<MessagePool>,
    pub sessions: SessionTable,
    pub scheduler: GreedyScheduler,
    pub driver: Box<dyn Driver>,
}

impl Runtime {
    pub fn pool_for(&self, handle: CtxHandle) -> &MessagePool {
        &self.pools[handle.index()]
    }
}

/// Builds the context table and binds it into a fresh Greedy scheduler,
/// unwinding (releasing already-allocated queue pairs) on partial
/// failure — the scoped-acquisition replacement for the original's
/// goto-based unwind (§4.8, §9).
fn build_runtime(config: &Config, driver: Box<dyn Driver>) -> Result<Runtime, WdError> {
    let queue_handles = driver
        .init(config.contexts.len())
        .map_err(|e| {
            warn!(error = %e, "driver init failed, no queue pairs allocated");
            WdError::Other(e)
        })?;

    if queue_handles.len() != config.contexts.len() {
        let _ = driver.exit();
        return Err(WdError::Other(anyhow::anyhow!(
            "driver returned {} queue handles for {} contexts",
            queue_handles.len(),
            config.contexts.len()
        )));
    }

    let contexts: Vec<Context<usize>> = config
        .contexts
        .iter()
        .zip(queue_handles)
        .map(|(spec, qh)| Context::new(spec.op_type, spec.mode, spec.numa_id, qh))
        .collect();

    let pools = contexts.iter().map(|_| MessagePool::new()).collect();
    let table = ContextTable::new(contexts);

    let mut scheduler = greedy_alloc(config.scheduler.numa_num);
    for (handle, ctx) in table.iter() {
        if let Err(e) = greedy_bind_ctx(&mut scheduler, handle, ctx) {
            warn!(error = %e, "failed to bind context into scheduler, unwinding init");
            let _ = driver.exit();
            return Err(e);
        }
    }

    Ok(Runtime { contexts: table, pools, sessions: SessionTable::new(), scheduler, driver })
}

/// Initializes the process-wide runtime from `config`, bound to `driver`.
/// Fails with [`WdError::AlreadyInitialized`] if already initialized.
pub fn init(config: &Config, driver: Box<dyn Driver>) -> Result<(), WdError> {
    let mut guard = cell().write().expect("runtime lock poisoned");
    if matches!(*guard, State::Init(_)) {
        return Err(WdError::AlreadyInitialized);
    }
    let runtime = build_runtime(config, driver)?;
    info!(contexts = runtime.contexts.len(), "runtime initialized");
    *guard = State::Init(Box::new(runtime));
    Ok(())
}

/// Tears down the process-wide runtime. Idempotent: calling `uninit`
/// twice, or before `init`, is not an error. Logs a leak warning if any
/// context's message pool still has in-flight requests (§5).
pub fn uninit() -> Result<(), WdError> {
    let mut guard = cell().write().expect("runtime lock poisoned");
    let runtime = match std::mem::replace(&mut *guard, State::Uninit) {
        State::Init(runtime) => runtime,
        State::Uninit => return Ok(()),
    };

    for (handle, _) in runtime.contexts.iter() {
        let pool = runtime.pool_for(handle);
        if pool.has_in_flight() {
            warn!(
                ctx = handle.index(),
                in_flight = pool.in_flight_count(),
                "tearing down context with in-flight requests still in its message pool"
            );
        }
    }

    let result = runtime.driver.exit().map_err(WdError::Other);
    greedy_free(runtime.scheduler);
    info!("runtime torn down");
    result
}

/// Runs `f` against the initialized runtime, or returns
/// [`WdError::Uninitialized`]. Dispatch entry points (§4.5) all go
/// through this; concurrent calls only ever take the read lock, so they
/// never serialize against each other, only against `init`/`uninit`.
pub fn with_runtime<R>(f: impl FnOnce(&Runtime) -> Result<R, WdError>) -> Result<R, WdError> {
    let guard = cell().read().expect("runtime lock poisoned");
    match &*guard {
        State::Init(runtime) => f(runtime),
        State::Uninit => Err(WdError::Uninitialized),
    }
}
