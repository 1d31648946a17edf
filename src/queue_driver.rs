// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Queue Driver (spec §4.1): a thin non-blocking shim over one context's
//! submission/completion queue pair.
//!
//! Real device enumeration/mmap is out of scope (§1) and lives behind
//! this trait; [`MockDriver`] is the in-process stand-in used by tests and
//! the demo program, backed by real `flate2` zlib/gzip codecs so the
//! round trip it exercises is genuine, not faked bytes.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use std::io::{Read, Write};

use flate2::{
    Compression,
    read::{GzDecoder, ZlibDecoder},
    write::{GzEncoder, ZlibEncoder},
};

use crate::{
    cfg::enums::CompAlg,
    descriptor::{Descriptor, STATUS_OK},
    error::WdError,
};

/// A context's queue-pair handle: an index assigned by `init`, in the
/// order contexts were requested. Kept a plain integer rather than an
/// associated type so a single `Box<dyn Driver>` can back the process
/// singleton regardless of concrete driver (§9 typed-handle redesign
/// flag applies to session/context handles, not to this driver-private
/// index).
pub type QueueHandle = usize;

/// Non-blocking shim over one context's SQ/CQ pair (spec §4.1).
pub trait Driver: Send + Sync {
    /// Allocates one queue pair per requested context, in order. Must
    /// unwind (release already-allocated pairs) on partial failure
    /// (§4.8).
    fn init(&self, num_contexts: usize) -> anyhow::Result<Vec<QueueHandle>>;

    /// Frees all queue pairs. Idempotent.
    fn exit(&self) -> anyhow::Result<()>;

    /// Posts `desc` to the SQ tail. Returns `Err(QueueFull)` if the SQ
    /// cannot accept it; never blocks.
    fn send(&self, handle: QueueHandle, desc: &Descriptor) -> Result<(), WdError>;

    /// Reads one completed descriptor from the CQ head into `desc_out`.
    /// `Ok(false)` means `EMPTY` (the normal non-blocking case, not an
    /// error); `Ok(true)` means a completion was written. Never blocks.
    fn recv(&self, handle: QueueHandle, desc_out: &mut Descriptor) -> Result<bool, WdError>;
}

/// Address-keyed fake physical memory shared between a [`MockDriver`] and
/// its caller, standing in for DMA-mapped buffers (out of scope per §1's
/// device-enumeration boundary).
#[derive(Default)]
pub struct MockMemory {
    regions: DashMap<u64, Vec<u8>>,
    next_addr: AtomicU64,
}

impl MockMemory {
    pub fn new() -> Self {
        MockMemory { regions: DashMap::new(), next_addr: AtomicU64::new(0x1000) }
    }

    fn alloc_addr(&self, len: usize) -> u64 {
        // Leave generous headroom between regions; nothing reads past the
        // registered Vec's own length regardless of this stride.
        self.next_addr.fetch_add((len.max(64) as u64) + 4096, Ordering::Relaxed)
    }

    /// Registers `data` as a source region, returning its fake address.
    pub fn alloc_with(&self, data: &[u8]) -> u64 {
        let addr = self.alloc_addr(data.len());
        self.regions.insert(addr, data.to_vec());
        addr
    }

    /// Registers a zeroed destination region of `len` bytes.
    pub fn alloc_zeroed(&self, len: usize) -> u64 {
        let addr = self.alloc_addr(len);
        self.regions.insert(addr, vec![0u8; len]);
        addr
    }

    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        self.regions.get(&addr).map(|r| r[..len.min(r.len())].to_vec()).unwrap_or_default()
    }

    pub fn write(&self, addr: u64, data: &[u8]) {
        if let Some(mut region) = self.regions.get_mut(&addr) {
            let n = data.len().min(region.len());
            region[..n].copy_from_slice(&data[..n]);
        }
    }
}

struct MockQueuePair {
    cq: Mutex<VecDeque<Descriptor>>,
}

/// An in-process `Driver` that performs real zlib/gzip compression via
/// `flate2` against [`MockMemory`]-backed buffers, completing each send
/// synchronously (the completion is simply enqueued for the next `recv`).
/// Cipher ops are out of scope for a real transform (§1) and are echoed
/// through unchanged.
pub struct MockDriver {
    memory: std::sync::Arc<MockMemory>,
    pairs: Mutex<Vec<std::sync::Arc<MockQueuePair>>>,
    fail_send: std::sync::atomic::AtomicBool,
}

impl MockDriver {
    pub fn new(memory: std::sync::Arc<MockMemory>) -> Self {
        MockDriver { memory, pairs: Mutex::new(Vec::new()), fail_send: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Test hook: makes the next `send` return `HwAccess`.
    pub fn inject_failure(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }
}

impl Driver for MockDriver {
    fn init(&self, num_contexts: usize) -> anyhow::Result<Vec<usize>> {
        let mut pairs = self.pairs.lock().expect("mock driver mutex poisoned");
        pairs.clear();
        for _ in 0..num_contexts {
            pairs.push(std::sync::Arc::new(MockQueuePair { cq: Mutex::new(VecDeque::new()) }));
        }
        Ok((0..num_contexts).collect())
    }

    fn exit(&self) -> anyhow::Result<()> {
        self.pairs.lock().expect("mock driver mutex poisoned").clear();
        Ok(())
    }

    fn send(&self, handle: usize, desc: &Descriptor) -> Result<(), WdError> {
        if self.fail_send.swap(false, Ordering::SeqCst) {
            return Err(WdError::HwAccess("injected mock failure".into()));
        }

        let pairs = self.pairs.lock().expect("mock driver mutex poisoned");
        let pair = pairs.get(handle).ok_or(WdError::InvalidParam("unknown context handle".into()))?;
        let pair = std::sync::Arc::clone(pair);
        drop(pairs);

        let completed = self.process(desc)?;
        pair.cq.lock().expect("mock cq mutex poisoned").push_back(completed);
        Ok(())
    }

    fn recv(&self, handle: usize, desc_out: &mut Descriptor) -> Result<bool, WdError> {
        let pairs = self.pairs.lock().expect("mock driver mutex poisoned");
        let pair = pairs.get(handle).ok_or(WdError::InvalidParam("unknown context handle".into()))?;
        let mut cq = pair.cq.lock().expect("mock cq mutex poisoned");
        match cq.pop_front() {
            Some(desc) => {
                *desc_out = desc;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl MockDriver {
    fn process(&self, desc: &Descriptor) -> Result<Descriptor, WdError> {
        let src_addr = Descriptor::addr_pair(desc.source_addr_l, desc.source_addr_h);
        let dst_addr = Descriptor::addr_pair(desc.dest_addr_l, desc.dest_addr_h);
        let src_len = desc.input_data_length.get() as usize;
        let dst_cap = desc.dest_avail_out.get() as usize;
        let src = self.memory.read(src_addr, src_len);

        // `cipher_key1_addr`/`cipher_key2_addr` being non-zero (set only by
        // the cipher specialization, §4.7) distinguishes a cipher op from a
        // comp op, since this mock does not decode the algorithm nibble.
        let key_addr = Descriptor::addr_pair(desc.cipher_key1_addr_l, desc.cipher_key1_addr_h);
        let is_cipher = key_addr != 0;

        let out = if is_cipher {
            src
        } else {
            let alg = if desc.dw9.get() as u8 == CompAlg::Gzip.wire_code() {
                CompAlg::Gzip
            } else {
                CompAlg::Zlib
            };
            match compress_or_decompress(alg, &src) {
                Ok(bytes) => bytes,
                Err(_) => {
                    let mut desc = *desc;
                    desc.dw3 = 0xFFu32.into();
                    return Ok(desc);
                }
            }
        };

        let produced = out.len().min(dst_cap);
        self.memory.write(dst_addr, &out[..produced]);

        let mut out_desc = *desc;
        out_desc.dw3 = (STATUS_OK as u32).into();
        out_desc.consumed = (src_len as u32).into();
        out_desc.produced = (produced as u32).into();
        out_desc.gzip_isize = (src_len as u32).into();
        Ok(out_desc)
    }
}

/// The mock's "hardware": one attempt at zlib/gzip deflate, falling back
/// to inflate if the input is not already deflate-compressible as-is.
/// Real hardware distinguishes compress/decompress via the session's
/// bound `op_type` rather than sniffing; the mock sniffs only because it
/// has no access to that context here and exists purely for round-trip
/// test fixtures.
fn compress_or_decompress(alg: CompAlg, src: &[u8]) -> anyhow::Result<Vec<u8>> {
    match alg {
        CompAlg::Zlib => {
            let mut decoder = ZlibDecoder::new(src);
            let mut buf = Vec::new();
            if decoder.read_to_end(&mut buf).is_ok() && !buf.is_empty() {
                return Ok(buf);
            }
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(src)?;
            Ok(encoder.finish()?)
        }
        CompAlg::Gzip => {
            let mut decoder = GzDecoder::new(src);
            let mut buf = Vec::new();
            if decoder.read_to_end(&mut buf).is_ok() && !buf.is_empty() {
                return Ok(buf);
            }
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(src)?;
            Ok(encoder.finish()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_round_trip_through_mock_driver() {
        let memory = std::sync::Arc::new(MockMemory::new());
        let driver = MockDriver::new(std::sync::Arc::clone(&memory));
        let handles = driver.init(1).expect("init ok");

        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let src_addr = memory.alloc_with(&plaintext);
        let dst_addr = memory.alloc_zeroed(8192);

        let mut desc = Descriptor::zeroed();
        desc.dw9 = (CompAlg::Zlib.wire_code() as u32).into();
        Descriptor::set_addr_pair(&mut desc.source_addr_l, &mut desc.source_addr_h, src_addr);
        Descriptor::set_addr_pair(&mut desc.dest_addr_l, &mut desc.dest_addr_h, dst_addr);
        desc.input_data_length = (plaintext.len() as u32).into();
        desc.dest_avail_out = 8192u32.into();

        driver.send(handles[0], &desc).expect("send ok");
        let mut completion = Descriptor::zeroed();
        assert!(driver.recv(handles[0], &mut completion).expect("recv ok"));
        assert_eq!(completion.status(), STATUS_OK);

        let produced = completion.produced.get() as usize;
        let compressed = memory.read(dst_addr, produced);

        let src_addr2 = memory.alloc_with(&compressed);
        let dst_addr2 = memory.alloc_zeroed(8192);
        let mut desc2 = Descriptor::zeroed();
        desc2.dw9 = (CompAlg::Zlib.wire_code() as u32).into();
        Descriptor::set_addr_pair(&mut desc2.source_addr_l, &mut desc2.source_addr_h, src_addr2);
        Descriptor::set_addr_pair(&mut desc2.dest_addr_l, &mut desc2.dest_addr_h, dst_addr2);
        desc2.input_data_length = (compressed.len() as u32).into();
        desc2.dest_avail_out = 8192u32.into();

        driver.send(handles[0], &desc2).expect("send ok");
        let mut completion2 = Descriptor::zeroed();
        assert!(driver.recv(handles[0], &mut completion2).expect("recv ok"));

        let produced2 = completion2.produced.get() as usize;
        let roundtripped = memory.read(dst_addr2, produced2);
        assert_eq!(roundtripped, plaintext);
    }

    #[test]
    fn recv_on_empty_cq_is_not_an_error() {
        let memory = std::sync::Arc::new(MockMemory::new());
        let driver = MockDriver::new(memory);
        let handles = driver.init(1).expect("init ok");
        let mut out = Descriptor::zeroed();
        assert!(!driver.recv(handles[0], &mut out).expect("empty recv is Ok(false)"));
    }

    #[test]
    fn injected_failure_surfaces_as_hw_access() {
        let memory = std::sync::Arc::new(MockMemory::new());
        let driver = MockDriver::new(memory);
        let handles = driver.init(1).expect("init ok");
        driver.inject_failure();
        let err = driver.send(handles[0], &Descriptor::zeroed()).expect_err("injected failure must surface");
        assert!(matches!(err, WdError::HwAccess(_)));
    }
}
