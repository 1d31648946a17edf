// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Core of a user-space accelerator offload runtime: multiplexes
//! application compression/cipher requests onto a fixed pool of hardware
//! contexts, each backed by one submission/completion queue pair.

pub mod cfg;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod hdc;
pub mod message_pool;
pub mod queue_driver;
pub mod request;
pub mod runtime;
pub mod scheduler;
pub mod session;

pub use context::{Context, ContextTable, CtxHandle};
pub use descriptor::Descriptor;
pub use dispatch::{do_async, do_stream, do_sync, poll, poll_ctx};
pub use error::{Result, WdError};
pub use queue_driver::{Driver, QueueHandle};
pub use request::{Callback, CompletionStatus, Request, RequestKind};
pub use runtime::{Runtime, init, uninit, with_runtime};
pub use scheduler::{GreedyScheduler, SchedKey, Scheduler, greedy_alloc, greedy_bind_ctx, greedy_free};
pub use session::{Session, SessionAlg, SessionHandle, SessionSetup, SessionTable};
