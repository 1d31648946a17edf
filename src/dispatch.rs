// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Dispatch (spec §4.5): `do_sync`, `do_stream`, `do_async`, `poll_ctx`,
//! `poll`. This is the only layer that combines scheduling, locking, the
//! Message Pool, and the queue driver; HDC and MP stay pure.

use tracing::{error, warn};

use crate::{
    cfg::enums::{FlushType, StreamMode, StreamPos},
    context::Context,
    descriptor::Descriptor,
    error::WdError,
    hdc::{self, StreamParams},
    request::Request,
    runtime::{self, Runtime},
    scheduler::Scheduler,
    session::{Session, SessionHandle},
};

/// `do_sync`'s busy-wait bound (spec §4.5): `2e8` consecutive non-progress
/// recv attempts before giving up with `Timeout`. This is a busy wait on
/// purpose — the driver contract forbids sleeping (§4.1).
pub const MAX_RETRY: u64 = 200_000_000;

fn send_and_spin(
    runtime: &Runtime,
    ctx: &Context<usize>,
    desc: &Descriptor,
) -> Result<hdc::Completion, WdError> {
    let _guard = ctx.lock.lock().expect("context mutex poisoned");

    if let Err(e) = runtime.driver.send(ctx.handle, desc) {
        warn!(error = %e, "queue driver send failed");
        return Err(e);
    }

    let mut retry: u64 = 0;
    loop {
        let mut resp = Descriptor::zeroed();
        match runtime.driver.recv(ctx.handle, &mut resp) {
            Ok(true) => match hdc::decode_completion(&resp) {
                Ok(completion) => return Ok(completion),
                Err(WdError::Again) => {}
                Err(e) => {
                    error!(error = %e, "completion decode failed");
                    return Err(e);
                }
            },
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "queue driver recv failed");
                return Err(e);
            }
        }

        retry += 1;
        if retry > MAX_RETRY {
            warn!(retries = retry, "do_sync exceeded MAX_RETRY, giving up");
            return Err(WdError::Timeout);
        }
    }
}

/// Synchronous one-shot dispatch (spec §4.5 `do_sync`).
pub fn do_sync(session_handle: SessionHandle, request: &mut Request) -> Result<(), WdError> {
    if !request.validate() {
        return Err(WdError::InvalidParam("dst_len too small for request".into()));
    }

    runtime::with_runtime(|rt| {
        rt.sessions
            .with_session(session_handle, |session| do_sync_inner(rt, session, request))
            .unwrap_or_else(|| Err(WdError::InvalidParam("unknown session handle".into())))
    })
}

fn do_sync_inner(rt: &Runtime, session: &Session, request: &mut Request) -> Result<(), WdError> {
    let handle = rt.scheduler.pick_next(&rt.contexts, session.sched_key())?;
    let ctx = rt.contexts.get(handle).expect("scheduler returned a valid handle");

    let stream = StreamParams::one_shot();
    let mut desc = Descriptor::zeroed();
    hdc::encode_request(&mut desc, request, 0, &stream);

    let completion = send_and_spin(rt, ctx, &desc)?;
    hdc::apply_completion(request, &completion);
    Ok(())
}

/// Stream-continuation dispatch (spec §4.5 `do_stream`). `is_last` selects
/// `FINISH` vs `SYNC_FLUSH`; on success the session's `stream_pos`
/// transitions unconditionally from `NEW` to `OLD` regardless of
/// `is_last` (see DESIGN.md for why this crate treats the transition as
/// unconditional rather than gated on the flush type).
pub fn do_stream(
    session_handle: SessionHandle,
    request: &mut Request,
    is_last: bool,
) -> Result<(), WdError> {
    if !request.validate() {
        return Err(WdError::InvalidParam("dst_len too small for request".into()));
    }

    runtime::with_runtime(|rt| {
        rt.sessions
            .with_session(session_handle, |session| do_stream_inner(rt, session, request, is_last))
            .unwrap_or_else(|| Err(WdError::InvalidParam("unknown session handle".into())))
    })
}

fn do_stream_inner(
    rt: &Runtime,
    session: &Session,
    request: &mut Request,
    is_last: bool,
) -> Result<(), WdError> {
    let handle = rt.scheduler.pick_next(&rt.contexts, session.sched_key())?;
    let ctx = rt.contexts.get(handle).expect("scheduler returned a valid handle");

    let stream = StreamParams {
        stream_pos: session.stream_pos(),
        stream_mode: StreamMode::Stateful,
        flush: if is_last { FlushType::Finish } else { FlushType::SyncFlush },
        stream_ctx_addr: session.stream_ctx_addr(),
        ctx_words_in: session.ctx_words_in(),
    };

    let mut desc = Descriptor::zeroed();
    hdc::encode_request(&mut desc, request, 0, &stream);

    let completion = send_and_spin(rt, ctx, &desc)?;
    hdc::apply_completion(request, &completion);
    if let Some(words) = completion.ctx_words_out {
        session.set_ctx_words(words);
    }
    session.advance_stream_pos();
    Ok(())
}

/// Async submit (spec §4.5 `do_async`). `callback` is invoked exactly
/// once, later, on whatever thread calls [`poll_ctx`]/[`poll`] and drains
/// this completion — never synchronously here.
pub fn do_async(
    session_handle: SessionHandle,
    request: Request,
    callback: crate::request::Callback,
) -> Result<(), WdError> {
    if !request.validate() {
        return Err(WdError::InvalidParam("dst_len too small for request".into()));
    }

    runtime::with_runtime(|rt| {
        rt.sessions
            .with_session(session_handle, |session| do_async_inner(rt, session, request, callback))
            .unwrap_or_else(|| Err(WdError::InvalidParam("unknown session handle".into())))
    })
}

fn do_async_inner(
    rt: &Runtime,
    session: &Session,
    request: Request,
    callback: crate::request::Callback,
) -> Result<(), WdError> {
    let handle = rt.scheduler.pick_next(&rt.contexts, session.sched_key())?;
    let ctx = rt.contexts.get(handle).expect("scheduler returned a valid handle");
    let pool = rt.pool_for(handle);

    let tag = pool.acquire(request, Some(callback)).ok_or(WdError::PoolFull)?;

    let stream = StreamParams { stream_pos: StreamPos::New, stream_mode: StreamMode::Stateless, flush: FlushType::Finish, stream_ctx_addr: None, ctx_words_in: [0; 3] };
    let mut desc = Descriptor::zeroed();
    hdc::encode_request(&mut desc, &request, tag.get(), &stream);

    let send_result = {
        let _guard = ctx.lock.lock().expect("context mutex poisoned");
        rt.driver.send(ctx.handle, &desc)
    };

    if let Err(e) = send_result {
        warn!(error = %e, "async send failed, releasing message pool slot");
        pool.release(tag);
        return Err(e);
    }

    Ok(())
}

/// Drains up to `expect` completions from one context (spec §4.5
/// `poll_ctx`). Returns the number of completions actually drained; a
/// count lower than `expect` is not an error (best-effort, §4.4).
pub fn poll_ctx(rt: &Runtime, ctx_index: usize, expect: usize) -> Result<usize, WdError> {
    let handle = rt
        .contexts
        .handle_for(ctx_index)
        .ok_or_else(|| WdError::InvalidParam("unknown context index".into()))?;
    let ctx = rt.contexts.get(handle).expect("handle just resolved from this table");
    let pool = rt.pool_for(handle);

    let mut count = 0usize;
    for _ in 0..expect {
        let mut desc = Descriptor::zeroed();
        match rt.driver.recv(ctx.handle, &mut desc) {
            Ok(false) => break,
            Err(e) => return Err(e),
            Ok(true) => {}
        }

        let completion = match hdc::decode_completion(&desc) {
            Ok(c) => c,
            Err(WdError::Again) => break,
            Err(e) => return Err(e),
        };

        let tag = crate::message_pool::Tag::from_wire(completion.tag);
        let (mut request, callback) = match pool.take(tag) {
            Ok(pair) => pair,
            Err(e @ (WdError::StaleTag(_) | WdError::BadTag(_))) => {
                warn!(error = %e, "poll_ctx: completion tag did not resolve to a pool slot, skipping");
                continue;
            }
            Err(e) => {
                error!(error = %e, "poll_ctx: completion tag lookup failed");
                return Err(e);
            }
        };

        hdc::apply_completion(&mut request, &completion);
        if let Some(cb) = callback {
            cb(&request);
        }
        pool.release(tag);
        count += 1;
    }

    Ok(count)
}

/// Global poll across every async region (spec §4.5 `poll`, delegating to
/// `SCH.poll_policy`).
pub fn poll(expect: usize) -> Result<usize, WdError> {
    runtime::with_runtime(|rt| {
        let mut poll_one = |handle: crate::context::CtxHandle| poll_ctx(rt, handle.index(), expect);
        Scheduler::<usize>::poll_policy(&rt.scheduler, expect, &mut poll_one)
    })
}
