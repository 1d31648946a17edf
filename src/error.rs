// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Closed error taxonomy exposed at the API boundary (spec §7).
//!
//! Internal plumbing uses `anyhow::Result` the way the teacher layers
//! `anyhow` under a public `thiserror` enum; collaborator errors (device
//! enumeration, a concrete `Driver` implementation) are folded into
//! [`WdError::Other`] rather than downcast by callers.

use thiserror::Error;

/// Error kinds from spec §7's error-handling table.
#[derive(Debug, Error)]
pub enum WdError {
    /// Null/invalid inputs, out-of-range context index.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Allocation failure during `init`/`alloc_sess`.
    #[error("out of memory: {0}")]
    NoMemory(String),

    /// A bound context lacks SVA support (surfaced by `init`).
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Submission queue could not accept a descriptor; caller retries.
    #[error("submission queue full")]
    QueueFull,

    /// Message pool has no free slot; caller retries.
    #[error("message pool busy")]
    Busy,

    /// Completion queue empty (non-error, absorbed by sync spin).
    #[error("completion queue empty")]
    Again,

    /// Device mapping gone or a hardware fault surfaced by the driver.
    #[error("hardware access error: {0}")]
    HwAccess(String),

    /// `do_sync`/`do_stream` exceeded `MAX_RETRY` consecutive EAGAIN recvs.
    #[error("operation timed out")]
    Timeout,

    /// Completion status byte was not in the terminal-success set.
    #[error("bad completion status: 0x{0:02x}")]
    BadStatus(u8),

    /// Completion carried a tag outside `[1, POOL_MAX]`.
    #[error("tag {0} out of range")]
    BadTag(u32),

    /// Completion tag referenced a slot that was not in use.
    #[error("stale completion tag {0}")]
    StaleTag(u32),

    /// Message pool had no free slot on `acquire`.
    #[error("message pool full")]
    PoolFull,

    /// Scheduler could not find a region/context for the given key.
    #[error("no context available for key {0:?}")]
    InvalidSchedule(crate::scheduler::SchedKey),

    /// Runtime is not initialized, or a second `init` was attempted.
    #[error("runtime already initialized")]
    AlreadyInitialized,

    /// `do_sync`/`do_async`/etc. called before `init`.
    #[error("runtime not initialized")]
    Uninitialized,

    /// Catch-all for collaborator errors crossing a trait boundary
    /// (device enumeration, a concrete `Driver`).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WdError>;
