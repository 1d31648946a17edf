// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S6 from spec §8: `set_key` on a DES session with a known-weak key is
//! rejected, and the session's key state is left untouched.

use serial_test::serial;
use wd_offload_rt::{
    WdError,
    cfg::enums::{CipherAlg, CipherMode, Mode, OpType},
    runtime,
    session::{SessionAlg, SessionSetup},
};

use crate::unit_tests::common::{config_with, init_with_mock};

#[test]
#[serial]
fn s6_weak_des_key_is_rejected_and_session_key_unchanged() {
    let _memory = init_with_mock(&config_with(0));

    let session = runtime::with_runtime(|rt| {
        Ok(rt.sessions.alloc_sess(SessionSetup {
            alg: SessionAlg::Cipher(CipherAlg::Des, CipherMode::Ecb),
            op_type: OpType::CipherEncrypt,
            mode: Mode::Sync,
        }))
    })
    .expect("alloc_sess");

    let weak_key = [0x01u8; 8];
    let err = runtime::with_runtime(|rt| Ok(rt.sessions.set_key(session, &weak_key)))
        .expect("with_runtime")
        .expect_err("weak DES key must be rejected");
    assert!(matches!(err, WdError::InvalidParam(_)));

    runtime::with_runtime(|rt| {
        rt.sessions.with_session(session, |s| {
            assert_eq!(s.key_len(), 0, "rejected key must not be installed");
        });
        Ok(())
    })
    .expect("with_runtime");

    let good_key = [0x02u8; 8];
    runtime::with_runtime(|rt| Ok(rt.sessions.set_key(session, &good_key)))
        .expect("with_runtime")
        .expect("non-weak DES key accepted");
    runtime::with_runtime(|rt| {
        rt.sessions.with_session(session, |s| {
            assert_eq!(s.key_len(), 8);
        });
        Ok(())
    })
    .expect("with_runtime");

    let _ = runtime::uninit();
}
