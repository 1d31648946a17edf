// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed ring of in-flight message slots per context, keyed by tag
//! (spec §3 Message Pool, §4.3).
//!
//! The per-slot atomic `used` flag is the sole synchronizer between
//! `acquire` and `release` (§9 Design Notes, redesign flag kept as-is);
//! `tail` is a best-effort search hint, not a commit point.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::{
    error::WdError,
    request::{Callback, Request},
};

/// Fixed pool size (spec §3: `POOL_MAX = 1024`).
pub const POOL_MAX: usize = 1024;

/// A 1-based tag identifying an in-flight async request within one
/// context's message pool. Tag `0` is permanently reserved "invalid" so a
/// zero-initialized completion cannot masquerade as a valid reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u32);

impl Tag {
    #[inline]
    fn from_slot_index(idx: usize) -> Self {
        Tag((idx + 1) as u32)
    }

    /// Reconstructs a tag from the raw value carried back in a completed
    /// descriptor's `tag` word (§4.2, §4.5 `poll_ctx`).
    #[inline]
    pub fn from_wire(value: u32) -> Self {
        Tag(value)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    fn slot_index(self) -> Option<usize> {
        if self.0 == 0 || self.0 as usize > POOL_MAX {
            None
        } else {
            Some(self.0 as usize - 1)
        }
    }
}

struct SlotBody {
    request: Request,
    callback: Option<Callback>,
}

struct Slot {
    used: AtomicBool,
    body: UnsafeCell<Option<SlotBody>>,
}

// SAFETY: `used` is the sole synchronizer for `body`. A slot's body is
// written only by the thread that wins the acquire CAS, and read/taken
// only by a thread that observes `used == true`; mutual exclusion is
// established entirely through that boolean, never by reference aliasing.
unsafe impl Sync for Slot {}

impl Default for Slot {
    fn default() -> Self {
        Slot { used: AtomicBool::new(false), body: UnsafeCell::new(None) }
    }
}

/// One context's fixed ring of message slots (spec §4.3).
pub struct MessagePool {
    slots: Box<[Slot]>,
    tail: AtomicUsize,
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagePool {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(POOL_MAX);
        slots.resize_with(POOL_MAX, Slot::default);
        MessagePool { slots: slots.into_boxed_slice(), tail: AtomicUsize::new(0) }
    }

    /// Starting from `tail`, finds the first slot whose `used` flag CASes
    /// 0→1, stamps it with the caller's request, and returns its tag.
    /// Returns `None` (`POOL_FULL`) if a full scan finds no free slot.
    pub fn acquire(&self, request: Request, callback: Option<Callback>) -> Option<Tag> {
        let start = self.tail.load(Ordering::Relaxed);
        for i in 0..self.slots.len() {
            let idx = (start + i) % self.slots.len();
            if self.slots[idx]
                .used
                .compare_exchange(false, true, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: we just won exclusive ownership of this slot via
                // the CAS above; no other thread may touch `body` until it
                // observes `used == false` again after `release`.
                unsafe {
                    *self.slots[idx].body.get() = Some(SlotBody { request, callback });
                }
                self.tail.store((idx + 1) % self.slots.len(), Ordering::Relaxed);
                return Some(Tag::from_slot_index(idx));
            }
        }
        None
    }

    /// Looks up a completed request by tag, removing it from the slot and
    /// leaving the slot `used` (the caller must still call [`release`]).
    pub fn take(&self, tag: Tag) -> Result<(Request, Option<Callback>), WdError> {
        let idx = tag.slot_index().ok_or(WdError::BadTag(tag.get()))?;
        let slot = &self.slots[idx];
        if !slot.used.load(Ordering::Acquire) {
            return Err(WdError::StaleTag(tag.get()));
        }
        // SAFETY: `used == true` and this is the only call site that reads
        // `body` outside of `acquire`'s initial write; the caller owns the
        // tag until it calls `release`, so no concurrent `take`/`release`
        // can race this read.
        let body = unsafe { (*slot.body.get()).take() };
        match body {
            Some(SlotBody { request, callback }) => Ok((request, callback)),
            None => Err(WdError::StaleTag(tag.get())),
        }
    }

    /// Returns the slot to the free pool. Further access to the slot by the
    /// caller is undefined after this call (spec §4.3).
    pub fn release(&self, tag: Tag) {
        if let Some(idx) = tag.slot_index() {
            self.slots[idx].used.store(false, Ordering::Release);
        }
    }

    /// `true` if any slot is still marked used (teardown leak check, §3).
    pub fn has_in_flight(&self) -> bool {
        self.slots.iter().any(|s| s.used.load(Ordering::Acquire))
    }

    pub fn in_flight_count(&self) -> usize {
        self.slots.iter().filter(|s| s.used.load(Ordering::Acquire)).count()
    }
}
