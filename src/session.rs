// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session lifecycle (spec §4.6): `alloc_sess`/`free_sess`/`set_key`.
//!
//! Sessions are resolved through a `DashMap`-backed table keyed by a
//! sealed [`SessionHandle`], mirroring the teacher's
//! `Pool::sessions: DashMap<u16, Arc<Session>>` (§9 redesign flags).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{
    cfg::enums::{CipherAlg, CipherMode, CompAlg, Mode, OpType, StreamPos},
    error::WdError,
    scheduler::SchedKey,
};

/// 64 KiB stream-context scratch buffer, allocated only for sync-mode
/// sessions (only sync paths may carry stream state across calls, §4.6).
const STREAM_CTX_BYTES: usize = 64 * 1024;
const KEY_BUF_BYTES: usize = 64;

const WEAK_DES_KEYS: [[u8; 8]; 4] = [
    [0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01],
    [0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE],
    [0xE0, 0xE0, 0xE0, 0xE0, 0xF1, 0xF1, 0xF1, 0xF1],
    [0x1F, 0x1F, 0x1F, 0x1F, 0x0E, 0x0E, 0x0E, 0x0E],
];

/// Opaque, sealed handle into the session table. Only this module can
/// construct one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

/// The algorithm a session was allocated for (§4.2 compression, §4.7
/// cipher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAlg {
    Comp(CompAlg),
    Cipher(CipherAlg, CipherMode),
}

/// Caller-supplied parameters for [`alloc_sess`].
#[derive(Debug, Clone, Copy)]
pub struct SessionSetup {
    pub alg: SessionAlg,
    pub op_type: OpType,
    pub mode: Mode,
}

pub struct Session {
    pub alg: SessionAlg,
    pub op_type: OpType,
    pub mode: Mode,
    pub numa_id: u8,
    pub stream_pos: std::sync::atomic::AtomicU8,
    /// `Mutex`-wrapped so the first 12 bytes (the three `ctx_dwN` control
    /// words, §4.2) can be read/written through a shared `&Session`; a
    /// stream is inherently sequential per-caller, so this lock is never
    /// contended across concurrent `do_stream` calls on the same session.
    stream_ctx: Option<std::sync::Mutex<Box<[u8; STREAM_CTX_BYTES]>>>,
    key: Option<std::sync::Mutex<Box<[u8; KEY_BUF_BYTES]>>>,
    key_len: std::sync::atomic::AtomicUsize,
}

impl Session {
    pub fn sched_key(&self) -> SchedKey {
        SchedKey { op_type: self.op_type, mode: self.mode, numa_id: self.numa_id }
    }

    pub fn stream_ctx_addr(&self) -> Option<u64> {
        self.stream_ctx.as_ref().map(|m| m.lock().expect("stream ctx mutex poisoned").as_ptr() as u64)
    }

    /// The three `ctx_dwN` control words carried in ahead of a stream
    /// continuation call (§4.2).
    pub fn ctx_words_in(&self) -> [u32; 3] {
        let Some(m) = self.stream_ctx.as_ref() else { return [0; 3] };
        let buf = m.lock().expect("stream ctx mutex poisoned");
        std::array::from_fn(|i| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().expect("4-byte slice")))
    }

    /// Writes the three `ctx_dwN` words back after a completion (§4.2
    /// stream-context writeback).
    pub fn set_ctx_words(&self, words: [u32; 3]) {
        let Some(m) = self.stream_ctx.as_ref() else { return };
        let mut buf = m.lock().expect("stream ctx mutex poisoned");
        for (i, word) in words.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn stream_pos(&self) -> StreamPos {
        if self.stream_pos.load(Ordering::Acquire) == 0 { StreamPos::New } else { StreamPos::Old }
    }

    /// `do_stream`'s NEW → OLD transition on success (§4.5).
    pub fn advance_stream_pos(&self) {
        self.stream_pos.store(1, Ordering::Release);
    }

    pub fn key_addr(&self) -> Option<u64> {
        self.key.as_ref().map(|m| m.lock().expect("key mutex poisoned").as_ptr() as u64)
    }

    pub fn key_len(&self) -> usize {
        self.key_len.load(Ordering::Acquire)
    }
}

/// `DashMap`-backed session table, resolved by [`SessionHandle`].
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<u64, Session>,
    next_id: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable { sessions: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Allocates a zeroed session (§4.6 `alloc_sess`): copies `alg`,
    /// `mode`, `op_type`, starts at `numa_id = 0`; allocates a 64 KiB
    /// stream-context buffer only for sync-mode sessions, and a 64-byte
    /// key buffer for cipher sessions.
    pub fn alloc_sess(&self, setup: SessionSetup) -> SessionHandle {
        let stream_ctx = if setup.mode == Mode::Sync {
            Some(std::sync::Mutex::new(Box::new([0u8; STREAM_CTX_BYTES])))
        } else {
            None
        };
        let key = match setup.alg {
            SessionAlg::Cipher(..) => Some(std::sync::Mutex::new(Box::new([0u8; KEY_BUF_BYTES]))),
            SessionAlg::Comp(_) => None,
        };

        let session = Session {
            alg: setup.alg,
            op_type: setup.op_type,
            mode: setup.mode,
            numa_id: 0,
            stream_pos: std::sync::atomic::AtomicU8::new(0),
            stream_ctx,
            key,
            key_len: std::sync::atomic::AtomicUsize::new(0),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(id, session);
        SessionHandle(id)
    }

    /// Wipes the key buffer with zeros before dropping the session
    /// (security requirement for cipher sessions, §4.6).
    pub fn free_sess(&self, handle: SessionHandle) {
        if let Some((_, session)) = self.sessions.remove(&handle.0)
            && let Some(key) = session.key.as_ref()
        {
            key.lock().expect("key mutex poisoned").iter_mut().for_each(|b| *b = 0);
        }
    }

    pub fn with_session<R>(&self, handle: SessionHandle, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.sessions.get(&handle.0).map(|s| f(&s))
    }

    /// Validates and installs a cipher key (§4.6 `set_key`).
    pub fn set_key(&self, handle: SessionHandle, key: &[u8]) -> Result<(), WdError> {
        let entry = self
            .sessions
            .get_mut(&handle.0)
            .ok_or_else(|| WdError::InvalidParam("unknown session handle".into()))?;

        let SessionAlg::Cipher(alg, mode) = entry.alg else {
            return Err(WdError::InvalidParam("set_key on a non-cipher session".into()));
        };

        validate_key_len(alg, mode, key.len())?;
        if alg == CipherAlg::Des {
            check_not_weak_des_key(key)?;
        }

        let buf = entry.key.as_ref().expect("cipher session always has a key buffer");
        let mut buf = buf.lock().expect("key mutex poisoned");
        if key.len() > buf.len() {
            return Err(WdError::InvalidParam("key exceeds session key buffer".into()));
        }
        buf[..key.len()].copy_from_slice(key);
        drop(buf);
        entry.key_len.store(key.len(), Ordering::Release);
        Ok(())
    }
}

fn validate_key_len(alg: CipherAlg, mode: CipherMode, len: usize) -> Result<(), WdError> {
    let effective_len = if mode == CipherMode::Xts {
        if !len.is_multiple_of(2) {
            return Err(WdError::InvalidParam("XTS key length must be even".into()));
        }
        len / 2
    } else {
        len
    };

    let ok = match alg {
        CipherAlg::Aes => matches!(effective_len, 16 | 24 | 32),
        CipherAlg::Sm4 => effective_len == 16,
        CipherAlg::Des => effective_len == 8,
        CipherAlg::ThreeDes => matches!(effective_len, 16 | 24),
    };

    if ok {
        Ok(())
    } else {
        Err(WdError::InvalidParam(format!(
            "invalid key length {len} for {alg} in {mode} mode"
        )))
    }
}

fn check_not_weak_des_key(key: &[u8]) -> Result<(), WdError> {
    if key.len() == 8 && WEAK_DES_KEYS.iter().any(|weak| weak == key) {
        return Err(WdError::InvalidParam("DES key is a known weak key".into()));
    }
    Ok(())
}
