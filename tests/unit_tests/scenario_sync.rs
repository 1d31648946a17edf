// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S1/S2 from spec §8: a sync one-shot compress, fed back through a sync
//! one-shot decompress, must reproduce the original bytes exactly.

use serial_test::serial;
use wd_offload_rt::{
    cfg::enums::{CompAlg, Mode, OpType},
    do_sync, request::Request, runtime,
    session::{SessionAlg, SessionSetup},
};

use crate::unit_tests::common::{config_with, init_with_mock};

fn round_trip(alg: CompAlg, src: &[u8]) -> Vec<u8> {
    let memory = init_with_mock(&config_with(0));

    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup { alg: SessionAlg::Comp(alg), op_type: OpType::Compress, mode: Mode::Sync }))
    })
    .expect("alloc_sess");

    let src_addr = memory.alloc_with(src);
    let dst_addr = memory.alloc_zeroed(8192);
    let mut req = Request::new_comp(alg, src_addr, src.len() as u32, dst_addr, 8192);
    do_sync(session, &mut req).expect("compress do_sync");
    assert!(req.produced > 0);
    let compressed = memory.read(dst_addr, req.produced as usize);

    let src_addr2 = memory.alloc_with(&compressed);
    let dst_addr2 = memory.alloc_zeroed(8192);
    let mut req2 = Request::new_comp(alg, src_addr2, compressed.len() as u32, dst_addr2, 8192);
    do_sync(session, &mut req2).expect("decompress do_sync");
    let output = memory.read(dst_addr2, req2.produced as usize);

    runtime::with_runtime(|rt| {
        rt.sessions.free_sess(session);
        Ok(())
    })
    .expect("free_sess");
    let _ = runtime::uninit();

    output
}

#[test]
#[serial]
fn s1_sync_one_shot_zlib_round_trips() {
    let src = b"go to test.";
    let out = round_trip(CompAlg::Zlib, src);
    assert_eq!(out, src);
}

#[test]
#[serial]
fn s2_sync_one_shot_gzip_round_trips() {
    // The device-specific gzip header with the extra-field bit set (§6) is
    // produced by the stream-framing layer, which sits above block
    // compression and is explicitly out of scope (§1); this crate's mock
    // hardware delegates gzip framing to `flate2`, so we assert the
    // standard gzip magic instead of the device-specific header bytes.
    let memory = init_with_mock(&config_with(0));
    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup {
            alg: SessionAlg::Comp(CompAlg::Gzip),
            op_type: OpType::Compress,
            mode: Mode::Sync,
        }))
    })
    .expect("alloc_sess");

    let src = b"go to test.";
    let src_addr = memory.alloc_with(src);
    let dst_addr = memory.alloc_zeroed(8192);
    let mut req = Request::new_comp(CompAlg::Gzip, src_addr, src.len() as u32, dst_addr, 8192);
    do_sync(session, &mut req).expect("compress do_sync");
    let compressed = memory.read(dst_addr, req.produced as usize);
    assert_eq!(&compressed[..2], &[0x1f, 0x8b], "gzip magic bytes");

    let src_addr2 = memory.alloc_with(&compressed);
    let dst_addr2 = memory.alloc_zeroed(8192);
    let mut req2 = Request::new_comp(CompAlg::Gzip, src_addr2, compressed.len() as u32, dst_addr2, 8192);
    do_sync(session, &mut req2).expect("decompress do_sync");
    let output = memory.read(dst_addr2, req2.produced as usize);
    assert_eq!(output, src);

    let _ = runtime::uninit();
}
