// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The 32-word (128-byte) fixed hardware descriptor (spec §3, §6).
//!
//! Field names and layout are taken directly from the reference hardware's
//! `struct hisi_zip_sqe`: 32 little-endian `u32` words, reused verbatim for
//! both compression and cipher descriptors (the cipher specialization in
//! §4.7 repurposes `cipher_key1_addr_*`/`cipher_key2_addr_*` instead of
//! `stream_ctx_addr_*`).

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::U32 as LeU32,
};

pub const DESCRIPTOR_WORDS: usize = 32;
pub const DESCRIPTOR_BYTES: usize = DESCRIPTOR_WORDS * 4;

/// Bit-packing constants for `dw7` (§4.2).
pub const STREAM_FLUSH_SHIFT: u32 = 25;
pub const STREAM_POS_SHIFT: u32 = 2;
pub const STREAM_MODE_SHIFT: u32 = 1;

/// Descriptor floor for `dest_avail_out` (§4.2).
pub const MIN_AVAIL_OUT: u32 = 4096;

/// Terminal-success completion status bytes (§4.2, §6).
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_NEGACOMPRESS: u8 = 0x0D;
pub const STATUS_CRC_ERR: u8 = 0x10;
pub const STATUS_DECOMP_END: u8 = 0x13;

#[inline]
pub fn is_terminal_success(status: u8) -> bool {
    matches!(
        status,
        STATUS_OK | STATUS_NEGACOMPRESS | STATUS_CRC_ERR | STATUS_DECOMP_END
    )
}

/// The 128-byte descriptor, laid out exactly as the device consumes it.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Descriptor {
    pub consumed: LeU32,          // 0  (out)
    pub produced: LeU32,          // 1  (out)
    pub comp_data_length: LeU32, // 2
    pub dw3: LeU32,               // 3  status low byte (out)
    pub input_data_length: LeU32, // 4  (in)
    pub lba_l: LeU32,             // 5
    pub lba_h: LeU32,             // 6
    pub dw7: LeU32,               // 7  flush/mode/pos bits (in)
    pub dw8: LeU32,               // 8
    pub dw9: LeU32,               // 9  algorithm low byte (in)
    pub dw10: LeU32,              // 10
    pub priv_info: LeU32,         // 11
    pub dw12: LeU32,              // 12
    pub tag: LeU32,                // 13 (in/out)
    pub dest_avail_out: LeU32,    // 14 (in)
    pub ctx_dw0: LeU32,            // 15 (in/out)
    pub comp_head_addr_l: LeU32,  // 16
    pub comp_head_addr_h: LeU32,  // 17
    pub source_addr_l: LeU32,     // 18 (in)
    pub source_addr_h: LeU32,     // 19 (in)
    pub dest_addr_l: LeU32,       // 20 (in)
    pub dest_addr_h: LeU32,       // 21 (in)
    pub stream_ctx_addr_l: LeU32, // 22 (in)
    pub stream_ctx_addr_h: LeU32, // 23 (in)
    pub cipher_key1_addr_l: LeU32, // 24
    pub cipher_key1_addr_h: LeU32, // 25
    pub cipher_key2_addr_l: LeU32, // 26
    pub cipher_key2_addr_h: LeU32, // 27
    pub ctx_dw1: LeU32,            // 28 (in/out)
    pub ctx_dw2: LeU32,            // 29 (in/out)
    pub gzip_isize: LeU32,         // 30 (in/out)
    pub checksum: LeU32,           // 31 (in/out)
}

impl Descriptor {
    pub const fn zeroed() -> Self {
        // SAFETY-free: all fields are plain-old-data wrapper ints, all-zero
        // is a valid bit pattern for every one of them.
        Self {
            consumed: LeU32::ZERO,
            produced: LeU32::ZERO,
            comp_data_length: LeU32::ZERO,
            dw3: LeU32::ZERO,
            input_data_length: LeU32::ZERO,
            lba_l: LeU32::ZERO,
            lba_h: LeU32::ZERO,
            dw7: LeU32::ZERO,
            dw8: LeU32::ZERO,
            dw9: LeU32::ZERO,
            dw10: LeU32::ZERO,
            priv_info: LeU32::ZERO,
            dw12: LeU32::ZERO,
            tag: LeU32::ZERO,
            dest_avail_out: LeU32::ZERO,
            ctx_dw0: LeU32::ZERO,
            comp_head_addr_l: LeU32::ZERO,
            comp_head_addr_h: LeU32::ZERO,
            source_addr_l: LeU32::ZERO,
            source_addr_h: LeU32::ZERO,
            dest_addr_l: LeU32::ZERO,
            dest_addr_h: LeU32::ZERO,
            stream_ctx_addr_l: LeU32::ZERO,
            stream_ctx_addr_h: LeU32::ZERO,
            cipher_key1_addr_l: LeU32::ZERO,
            cipher_key1_addr_h: LeU32::ZERO,
            cipher_key2_addr_l: LeU32::ZERO,
            cipher_key2_addr_h: LeU32::ZERO,
            ctx_dw1: LeU32::ZERO,
            ctx_dw2: LeU32::ZERO,
            gzip_isize: LeU32::ZERO,
            checksum: LeU32::ZERO,
        }
    }

    #[inline]
    pub fn status(&self) -> u8 {
        (self.dw3.get() & 0xFF) as u8
    }

    #[inline]
    pub fn set_addr_pair(lo: &mut LeU32, hi: &mut LeU32, addr: u64) {
        *lo = LeU32::new(addr as u32);
        *hi = LeU32::new((addr >> 32) as u32);
    }

    #[inline]
    pub fn addr_pair(lo: LeU32, hi: LeU32) -> u64 {
        (u64::from(hi.get()) << 32) | u64::from(lo.get())
    }
}

/// Packs `(stream_pos, stream_mode, flush_type)` into the `dw7` layout from
/// §4.2: "starting at bit 25: `stream_pos` bit at bit offset 2 within that
/// field, `stream_mode` bit at offset 1, `flush_type` bit at offset 0."
#[inline]
pub fn pack_dw7(stream_pos: bool, stream_mode: bool, flush_type: bool) -> u32 {
    let pos = u32::from(stream_pos) << STREAM_POS_SHIFT;
    let mode = u32::from(stream_mode) << STREAM_MODE_SHIFT;
    let flush = u32::from(flush_type);
    (pos | mode | flush) << STREAM_FLUSH_SHIFT
}

/// Inverse of [`pack_dw7`]: returns `(stream_pos, stream_mode, flush_type)`.
#[inline]
pub fn unpack_dw7(dw7: u32) -> (bool, bool, bool) {
    let field = dw7 >> STREAM_FLUSH_SHIFT;
    let pos = (field >> STREAM_POS_SHIFT) & 1 != 0;
    let mode = (field >> STREAM_MODE_SHIFT) & 1 != 0;
    let flush = field & 1 != 0;
    (pos, mode, flush)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_exactly_128_bytes() {
        assert_eq!(DESCRIPTOR_BYTES, 128);
        assert_eq!(core::mem::size_of::<Descriptor>(), DESCRIPTOR_BYTES);
    }

    #[test]
    fn dw7_roundtrip() {
        for pos in [false, true] {
            for mode in [false, true] {
                for flush in [false, true] {
                    let packed = pack_dw7(pos, mode, flush);
                    assert_eq!(unpack_dw7(packed), (pos, mode, flush));
                }
            }
        }
    }

    #[test]
    fn addr_pair_roundtrip() {
        let addr: u64 = 0x1234_5678_9abc_def0;
        let mut lo = LeU32::ZERO;
        let mut hi = LeU32::ZERO;
        Descriptor::set_addr_pair(&mut lo, &mut hi, addr);
        assert_eq!(Descriptor::addr_pair(lo, hi), addr);
    }

    #[test]
    fn terminal_success_set() {
        assert!(is_terminal_success(0x00));
        assert!(is_terminal_success(0x0D));
        assert!(is_terminal_success(0x10));
        assert!(is_terminal_success(0x13));
        assert!(!is_terminal_success(0x01));
    }
}
