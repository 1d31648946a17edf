// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S5 from spec §8: a driver whose `recv` always reports `EMPTY` makes
//! `do_sync` return `Timeout` after bounded retries, with the context
//! lock released and no deadlock.

use serial_test::serial;
use wd_offload_rt::{
    WdError,
    cfg::enums::{CompAlg, Mode, OpType},
    descriptor::Descriptor,
    do_sync,
    queue_driver::{Driver, QueueHandle},
    request::Request,
    runtime,
    session::{SessionAlg, SessionSetup},
};

use crate::unit_tests::common::config_with;

/// Always accepts `send`, never produces a completion. Exercises
/// `do_sync`'s `MAX_RETRY`-bounded spin (§4.5, §5) without depending on
/// timing.
struct AlwaysEagainDriver;

impl Driver for AlwaysEagainDriver {
    fn init(&self, num_contexts: usize) -> anyhow::Result<Vec<QueueHandle>> {
        Ok((0..num_contexts).collect())
    }

    fn exit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn send(&self, _handle: QueueHandle, _desc: &Descriptor) -> Result<(), WdError> {
        Ok(())
    }

    fn recv(&self, _handle: QueueHandle, _desc_out: &mut Descriptor) -> Result<bool, WdError> {
        Ok(false)
    }
}

#[test]
#[serial]
fn s5_sync_spin_times_out_without_deadlock() {
    let _ = runtime::uninit();
    runtime::init(&config_with(0), Box::new(AlwaysEagainDriver)).expect("runtime init");

    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup {
            alg: SessionAlg::Comp(CompAlg::Zlib),
            op_type: OpType::Compress,
            mode: Mode::Sync,
        }))
    })
    .expect("alloc_sess");

    let mut req = Request::new_comp(CompAlg::Zlib, 0x1000, 16, 0x2000, 4096);
    let err = do_sync(session, &mut req).expect_err("do_sync must time out");
    assert!(matches!(err, WdError::Timeout));

    // The context lock was released: a second `do_sync` on the same
    // context must be able to acquire it (and also time out), not hang.
    let mut req2 = Request::new_comp(CompAlg::Zlib, 0x1000, 16, 0x2000, 4096);
    let err2 = do_sync(session, &mut req2).expect_err("second do_sync must also time out");
    assert!(matches!(err2, WdError::Timeout));

    let _ = runtime::uninit();
}
