//! In-memory probes for unit tests

use crate::probe::{CpuSource, Killer};
use crate::usage::CpuTicks;
use anyhow::{Result, anyhow};
use libc::pid_t;
use nix::errno::Errno;
use std::collections::HashMap;

/// Records every kill instead of sending it
#[derive(Debug, Default)]
pub struct RecordingKiller {
    pub signalled: Vec<pid_t>,
    pub failures: HashMap<pid_t, Errno>,
}

impl RecordingKiller {
    pub fn failing(pid: pid_t, errno: Errno) -> Self {
        Self {
            signalled: Vec::new(),
            failures: HashMap::from([(pid, errno)]),
        }
    }
}

impl Killer for RecordingKiller {
    fn kill(&mut self, pid: pid_t) -> nix::Result<()> {
        self.signalled.push(pid);
        match self.failures.get(&pid) {
            Some(&errno) => Err(errno),
            None => Ok(()),
        }
    }
}

/// Serves readings set by the test; pids without one behave as exited
#[derive(Debug, Default)]
pub struct FakeCpu {
    pub readings: HashMap<pid_t, CpuTicks>,
}

impl FakeCpu {
    pub fn set(&mut self, pid: pid_t, user: u64, system: u64) {
        self.readings.insert(pid, CpuTicks::new(user, system));
    }

    pub fn remove(&mut self, pid: pid_t) {
        self.readings.remove(&pid);
    }
}

impl CpuSource for FakeCpu {
    fn read(&mut self, pid: pid_t) -> Result<CpuTicks> {
        self.readings
            .get(&pid)
            .copied()
            .ok_or_else(|| anyhow!("No such process: {pid}"))
    }

    fn ticks_per_second(&self) -> u64 {
        100
    }
}
