// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{Mode, OpType};

/// Static deployment description for one runtime: the context table layout
/// and the logger settings to apply before `init` runs.
///
/// This does not describe anything discovered at runtime (device nodes,
/// SVA capability, mapped queue memory) — that is the device-enumeration
/// collaborator's job, out of scope per spec §1.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Ordered context table, one entry per hardware context to register.
    #[serde(rename = "Contexts")]
    pub contexts: Vec<ContextSpec>,

    /// Scheduler policy to bind (only Greedy is implemented, §4.4).
    #[serde(rename = "Scheduler", default)]
    pub scheduler: SchedulerSpec,

    /// Logger settings, layered the same way as `cfg/logger.rs` expects.
    #[serde(rename = "Logger", default)]
    pub logger: Option<LoggerRef>,
}

/// One row of the Context Table (§3 Context).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContextSpec {
    #[serde(rename = "OpType")]
    pub op_type: OpType,
    #[serde(rename = "Mode")]
    pub mode: Mode,
    #[serde(rename = "NumaId")]
    pub numa_id: u8,
    /// Device node hint for the (out-of-scope) enumeration collaborator,
    /// e.g. `/dev/hisi_zip-0`. Not interpreted by this crate.
    #[serde(rename = "DeviceNode", default)]
    pub device_node: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SchedulerSpec {
    #[serde(rename = "Type", default)]
    pub kind: SchedulerKind,
    /// Number of NUMA nodes the scheduler should allocate regions for.
    #[serde(rename = "NumaNum", default = "default_numa_num")]
    pub numa_num: u8,
}

fn default_numa_num() -> u8 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub enum SchedulerKind {
    #[default]
    #[serde(rename = "greedy", alias = "Greedy", alias = "GREEDY")]
    Greedy,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggerRef {
    /// Path to the YAML file consumed by `cfg::logger::init_logger`.
    #[serde(rename = "ConfigPath")]
    pub config_path: String,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read config file: {:?}", path.as_ref())
        })?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates invariants needed by `Runtime::init` (§3 Global Runtime
    /// Settings, §7 `init` transactional contract).
    pub fn validate(&mut self) -> Result<()> {
        ensure!(!self.contexts.is_empty(), "Contexts must not be empty");
        ensure!(
            self.scheduler.numa_num > 0,
            "Scheduler.NumaNum must be >= 1"
        );
        for (i, c) in self.contexts.iter().enumerate() {
            ensure!(
                (c.numa_id as usize) < self.scheduler.numa_num as usize,
                "context[{i}].NumaId={} is out of range for NumaNum={}",
                c.numa_id,
                self.scheduler.numa_num
            );
        }
        Ok(())
    }
}
