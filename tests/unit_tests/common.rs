// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared fixtures for the end-to-end scenario suite (spec §8).

use std::sync::Arc;

use wd_offload_rt::{
    cfg::{
        config::{Config, ContextSpec, SchedulerSpec},
        enums::{Mode, OpType},
    },
    queue_driver::{MockDriver, MockMemory},
    runtime,
};

/// A context table with one sync-compress, one sync-decompress, and
/// `async_contexts` async-compress contexts, all on NUMA node 0.
pub fn config_with(async_contexts: usize) -> Config {
    let mut contexts = vec![
        ContextSpec { op_type: OpType::Compress, mode: Mode::Sync, numa_id: 0, device_node: None },
        ContextSpec { op_type: OpType::Decompress, mode: Mode::Sync, numa_id: 0, device_node: None },
    ];
    for _ in 0..async_contexts {
        contexts.push(ContextSpec { op_type: OpType::Compress, mode: Mode::Async, numa_id: 0, device_node: None });
    }
    Config { contexts, scheduler: SchedulerSpec { numa_num: 1, ..Default::default() }, logger: None }
}

/// Initializes the process-wide runtime against a fresh [`MockDriver`],
/// tearing down any runtime left over from a previous test first (tests
/// sharing the singleton must be run with `#[serial]`).
pub fn init_with_mock(config: &Config) -> Arc<MockMemory> {
    let _ = runtime::uninit();
    let memory = Arc::new(MockMemory::new());
    let driver = Box::new(MockDriver::new(Arc::clone(&memory)));
    runtime::init(config, driver).expect("runtime init with mock driver");
    memory
}
