// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The generic caller-visible request/response struct that flows through
//! `do_sync`/`do_stream`/`do_async` and back out through a Message Pool
//! slot (spec §3 Message Slot, §4.2, §4.7).

use crate::cfg::enums::{CipherAlg, CipherMode, CompAlg};

/// Which algorithm family a request targets, and the fields specific to
/// that family (§4.2 compression, §4.7 cipher specialization).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestKind {
    Comp {
        alg: CompAlg,
    },
    Cipher {
        alg: CipherAlg,
        mode: CipherMode,
        key_addr: u64,
        key_len: u8,
        iv_addr: u64,
    },
}

/// Completion status written back into the request by `do_sync`/
/// `poll_ctx` (§7 `BAD_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Ok,
    InputParamError,
}

/// One in-flight (or just-completed) unit of work.
///
/// A copy of this struct is what the Message Pool's `acquire` stamps into a
/// slot (§4.3); `do_sync`/`do_stream` instead keep it on the caller's stack
/// since no pool bookkeeping is needed for the synchronous path (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    /// DMA/physical source buffer address and length in bytes.
    pub src_addr: u64,
    pub src_len: u32,
    /// DMA/physical destination buffer address and capacity in bytes.
    pub dst_addr: u64,
    pub dst_len: u32,
    /// Carried in (stream continuation) and out (final) per §4.2.
    pub isize_in: u32,
    pub checksum_in: u32,

    // --- response fields, valid once the request has completed ---
    pub consumed: u32,
    pub produced: u32,
    pub status: CompletionStatus,
    pub isize_out: u32,
    pub checksum_out: u32,
}

impl Request {
    pub fn new_comp(alg: CompAlg, src_addr: u64, src_len: u32, dst_addr: u64, dst_len: u32) -> Self {
        Self {
            kind: RequestKind::Comp { alg },
            src_addr,
            src_len,
            dst_addr,
            dst_len,
            isize_in: 0,
            checksum_in: 0,
            consumed: 0,
            produced: 0,
            status: CompletionStatus::Ok,
            isize_out: 0,
            checksum_out: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_cipher(
        alg: CipherAlg,
        mode: CipherMode,
        key_addr: u64,
        key_len: u8,
        iv_addr: u64,
        src_addr: u64,
        src_len: u32,
        dst_addr: u64,
        dst_len: u32,
    ) -> Self {
        Self {
            kind: RequestKind::Cipher { alg, mode, key_addr, key_len, iv_addr },
            src_addr,
            src_len,
            dst_addr,
            dst_len,
            isize_in: 0,
            checksum_in: 0,
            consumed: 0,
            produced: 0,
            status: CompletionStatus::Ok,
            isize_out: 0,
            checksum_out: 0,
        }
    }

    /// `dst_capacity >= src_len` is required for cipher requests (§4.5
    /// step 1).
    pub fn validate(&self) -> bool {
        match self.kind {
            RequestKind::Cipher { .. } => self.dst_len as usize >= self.src_len as usize,
            RequestKind::Comp { .. } => true,
        }
    }
}

/// Invoked by a polling thread exactly once per completed async request
/// (§4.5 `poll_ctx` step 5, §5 ordering guarantees). Never invoked
/// synchronously from `do_async`.
pub type Callback = Box<dyn FnOnce(&Request) + Send>;
