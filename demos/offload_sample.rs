// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Small demo mirroring `user_sched_sample.c`: build a context table, bind
//! it with the Greedy scheduler, run a one-shot zlib and gzip compress/
//! decompress round trip against a mock driver, then fan out a handful of
//! async requests and drain them with `poll`.

use std::sync::Arc;

use anyhow::{Context, Result};
use wd_offload_rt::{
    cfg::{
        config::{Config, ContextSpec, SchedulerSpec},
        enums::{CompAlg, Mode, OpType},
    },
    queue_driver::{MockDriver, MockMemory},
    request::Request,
    runtime,
    session::{SessionAlg, SessionSetup},
};

fn demo_config() -> Config {
    Config {
        contexts: vec![
            ContextSpec { op_type: OpType::Compress, mode: Mode::Sync, numa_id: 0, device_node: None },
            ContextSpec { op_type: OpType::Decompress, mode: Mode::Sync, numa_id: 0, device_node: None },
            ContextSpec { op_type: OpType::Compress, mode: Mode::Async, numa_id: 0, device_node: None },
        ],
        scheduler: SchedulerSpec { numa_num: 1, ..Default::default() },
        logger: None,
    }
}

fn run_one_shot(alg: CompAlg, memory: &MockMemory, src: &[u8]) -> Result<Vec<u8>> {
    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup {
            alg: SessionAlg::Comp(alg),
            op_type: OpType::Compress,
            mode: Mode::Sync,
        }))
    })?;

    let src_addr = memory.alloc_with(src);
    let dst_addr = memory.alloc_zeroed(8192);
    let mut req = Request::new_comp(alg, src_addr, src.len() as u32, dst_addr, 8192);
    wd_offload_rt::do_sync(session, &mut req).context("compress do_sync failed")?;
    let compressed = memory.read(dst_addr, req.produced as usize);

    let src_addr2 = memory.alloc_with(&compressed);
    let dst_addr2 = memory.alloc_zeroed(8192);
    let mut req2 = Request::new_comp(alg, src_addr2, compressed.len() as u32, dst_addr2, 8192);
    wd_offload_rt::do_sync(session, &mut req2).context("decompress do_sync failed")?;
    let output = memory.read(dst_addr2, req2.produced as usize);

    runtime::with_runtime(|rt| {
        rt.sessions.free_sess(session);
        Ok(())
    })?;

    Ok(output)
}

fn run_async_fan_in(memory: &Arc<MockMemory>) -> Result<()> {
    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup {
            alg: SessionAlg::Comp(CompAlg::Zlib),
            op_type: OpType::Compress,
            mode: Mode::Async,
        }))
    })?;

    let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    const N: usize = 5;
    for i in 0..N {
        let payload = format!("async payload #{i}").repeat(8);
        let src_addr = memory.alloc_with(payload.as_bytes());
        let dst_addr = memory.alloc_zeroed(4096);
        let req = Request::new_comp(CompAlg::Zlib, src_addr, payload.len() as u32, dst_addr, 4096);
        let done = Arc::clone(&done);
        wd_offload_rt::do_async(
            session,
            req,
            Box::new(move |resp| {
                println!("  async #{i} completed: produced={} status={:?}", resp.produced, resp.status);
                done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        )
        .context("do_async failed")?;
    }

    let drained = wd_offload_rt::poll(N)?;
    println!("poll drained {drained} of {N} submitted requests");

    runtime::with_runtime(|rt| {
        rt.sessions.free_sess(session);
        Ok(())
    })?;
    Ok(())
}

fn main() -> Result<()> {
    let memory = Arc::new(MockMemory::new());
    let driver = Box::new(MockDriver::new(Arc::clone(&memory)));
    runtime::init(&demo_config(), driver).context("runtime init failed")?;

    println!("-- S1: sync one-shot zlib --");
    let zlib_out = run_one_shot(CompAlg::Zlib, &memory, b"go to test.")?;
    println!("  round-trip bytes: {:?}", String::from_utf8_lossy(&zlib_out));
    assert_eq!(zlib_out, b"go to test.");

    println!("-- S2: sync one-shot gzip --");
    let gzip_out = run_one_shot(CompAlg::Gzip, &memory, b"go to test.")?;
    println!("  round-trip bytes: {:?}", String::from_utf8_lossy(&gzip_out));
    assert_eq!(gzip_out, b"go to test.");

    println!("-- S3/S4-shaped async fan-in --");
    run_async_fan_in(&memory)?;

    runtime::uninit().context("runtime uninit failed")?;
    println!("demo complete");
    Ok(())
}
