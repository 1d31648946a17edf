// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hardware Descriptor Codec: pure encode/decode between [`Request`] and
//! [`Descriptor`] (spec §4.2, cipher specialization §4.7).
//!
//! This layer is pure with respect to state it does not own — no locking,
//! no pool bookkeeping, no I/O. The builder writes directly into the SQ
//! slot handed back by the queue driver rather than building on the stack
//! and copying, per the ring-buffer shim's ownership model.

use crate::{
    cfg::enums::{CipherAlg, CipherMode, FlushType, StreamMode, StreamPos},
    descriptor::{
        Descriptor, MIN_AVAIL_OUT, is_terminal_success, pack_dw7, unpack_dw7,
    },
    error::WdError,
    request::{CompletionStatus, Request, RequestKind},
};

/// Stream-related framing bits that the dispatch layer decides per call
/// (`do_sync` always passes `NEW`/`STATELESS`/`FINISH`; `do_stream` derives
/// them from the session, §4.5).
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    pub stream_pos: StreamPos,
    pub stream_mode: StreamMode,
    pub flush: FlushType,
    /// Address of the session's stream-context buffer, if any. The
    /// descriptor's `stream_ctx_addr` points 64 bytes past its start; the
    /// first 64 bytes are reserved for the three `ctx_dwN` control words.
    pub stream_ctx_addr: Option<u64>,
    /// The three `ctx_dwN` words copied in from the session scratch ahead
    /// of this call (stream continuation).
    pub ctx_words_in: [u32; 3],
}

impl StreamParams {
    /// The framing used by `do_sync`: always a fresh, stateless, final call.
    pub fn one_shot() -> Self {
        StreamParams {
            stream_pos: StreamPos::New,
            stream_mode: StreamMode::Stateless,
            flush: FlushType::Finish,
            stream_ctx_addr: None,
            ctx_words_in: [0; 3],
        }
    }
}

/// Cipher algorithm/mode packed into `dw9`'s low byte in place of the
/// compression algorithm code (§4.7). Upper nibble is the algorithm,
/// lower nibble is the mode; there is no reference wire table for this
/// pairing in the distilled cipher path, so this encoding is this crate's
/// own choice, recorded in the grounding ledger.
fn cipher_wire_code(alg: CipherAlg, mode: CipherMode) -> u8 {
    let alg_nibble: u8 = match alg {
        CipherAlg::Aes => 0x1,
        CipherAlg::Sm4 => 0x2,
        CipherAlg::ThreeDes => 0x3,
        CipherAlg::Des => 0x4,
    };
    let mode_nibble: u8 = match mode {
        CipherMode::Ecb => 0x0,
        CipherMode::Cbc => 0x1,
        CipherMode::Ctr => 0x2,
        CipherMode::Xts => 0x3,
        CipherMode::Ofb => 0x4,
        CipherMode::Cfb => 0x5,
    };
    (alg_nibble << 4) | mode_nibble
}

/// Encodes `request` directly into the SQ slot `desc`, the way the queue
/// driver hands back a slot to write into rather than handing back a copy
/// (§9 Design Notes).
pub fn encode_request(desc: &mut Descriptor, request: &Request, tag: u32, stream: &StreamParams) {
    *desc = Descriptor::zeroed();

    let dw9_low = match request.kind {
        RequestKind::Comp { alg } => alg.wire_code(),
        RequestKind::Cipher { alg, mode, .. } => cipher_wire_code(alg, mode),
    };
    desc.dw9 = (dw9_low as u32).into();

    Descriptor::set_addr_pair(&mut desc.source_addr_l, &mut desc.source_addr_h, request.src_addr);
    Descriptor::set_addr_pair(&mut desc.dest_addr_l, &mut desc.dest_addr_h, request.dst_addr);

    if let RequestKind::Cipher { key_addr, iv_addr, .. } = request.kind {
        Descriptor::set_addr_pair(
            &mut desc.cipher_key1_addr_l,
            &mut desc.cipher_key1_addr_h,
            key_addr,
        );
        Descriptor::set_addr_pair(
            &mut desc.cipher_key2_addr_l,
            &mut desc.cipher_key2_addr_h,
            iv_addr,
        );
    }

    let dw7 = pack_dw7(
        stream.stream_pos == StreamPos::New,
        stream.stream_mode == StreamMode::Stateful,
        stream.flush == FlushType::Finish,
    );
    desc.dw7 = dw7.into();

    desc.input_data_length = request.src_len.into();
    desc.dest_avail_out = request.dst_len.max(MIN_AVAIL_OUT).into();
    desc.tag = tag.into();
    desc.gzip_isize = request.isize_in.into();
    desc.checksum = request.checksum_in.into();

    if let Some(ctx_addr) = stream.stream_ctx_addr {
        Descriptor::set_addr_pair(
            &mut desc.stream_ctx_addr_l,
            &mut desc.stream_ctx_addr_h,
            ctx_addr + 64,
        );
        desc.ctx_dw0 = stream.ctx_words_in[0].into();
        desc.ctx_dw1 = stream.ctx_words_in[1].into();
        desc.ctx_dw2 = stream.ctx_words_in[2].into();
    }
}

/// A decoded completion, carrying the tag so the caller can correlate it
/// back to a Message Pool slot (async path) or trust it directly (sync).
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub tag: u32,
    pub consumed: u32,
    pub produced: u32,
    pub status: CompletionStatus,
    pub isize_out: u32,
    pub checksum_out: u32,
    /// Set if the descriptor carried a stream-context address; these three
    /// words must be copied back into the session scratch by the caller.
    pub ctx_words_out: Option<[u32; 3]>,
}

/// Decodes a completed descriptor (§4.2 Decoding). Returns
/// [`WdError::Again`] on a spurious zero-progress wakeup, per the spec's
/// explicit `consumed == 0 && produced == 0` condition — this crate follows
/// that literal wording rather than the reference driver's `!consumed ||
/// !produced`, see the grounding ledger.
pub fn decode_completion(desc: &Descriptor) -> Result<Completion, WdError> {
    let status_byte = desc.status();
    let consumed = desc.consumed.get();
    let produced = desc.produced.get();

    if !is_terminal_success(status_byte) {
        return Ok(Completion {
            tag: desc.tag.get(),
            consumed,
            produced,
            status: CompletionStatus::InputParamError,
            isize_out: desc.gzip_isize.get(),
            checksum_out: desc.checksum.get(),
            ctx_words_out: stream_ctx_words(desc),
        });
    }

    if consumed == 0 && produced == 0 {
        return Err(WdError::Again);
    }

    Ok(Completion {
        tag: desc.tag.get(),
        consumed,
        produced,
        status: CompletionStatus::Ok,
        isize_out: desc.gzip_isize.get(),
        checksum_out: desc.checksum.get(),
        ctx_words_out: stream_ctx_words(desc),
    })
}

fn stream_ctx_words(desc: &Descriptor) -> Option<[u32; 3]> {
    let ctx_addr = Descriptor::addr_pair(desc.stream_ctx_addr_l, desc.stream_ctx_addr_h);
    if ctx_addr == 0 {
        return None;
    }
    Some([desc.ctx_dw0.get(), desc.ctx_dw1.get(), desc.ctx_dw2.get()])
}

/// Writes `request`'s response fields from a decoded completion (§4.5
/// `do_sync` step 7, `poll_ctx` step 4).
pub fn apply_completion(request: &mut Request, completion: &Completion) {
    request.consumed = completion.consumed;
    request.produced = completion.produced;
    request.status = completion.status;
    request.isize_out = completion.isize_out;
    request.checksum_out = completion.checksum_out;
}

/// Unpacks the framing bits a descriptor was built with, used by tests to
/// assert on what `encode_request` produced.
pub fn stream_params_of(desc: &Descriptor) -> (StreamPos, StreamMode, FlushType) {
    let (pos, mode, flush) = unpack_dw7(desc.dw7.get());
    (
        if pos { StreamPos::New } else { StreamPos::Old },
        if mode { StreamMode::Stateful } else { StreamMode::Stateless },
        if flush { FlushType::Finish } else { FlushType::SyncFlush },
    )
}
