//! OS-facing seams of the tree: signal delivery and CPU counter reads.
//!
//! [`ProcessTree`](crate::ProcessTree) only talks to the operating system through
//! these two traits, which keeps the lineage logic testable with in-memory fakes.

use crate::usage::CpuTicks;
use anyhow::Result;
#[cfg(target_os = "linux")]
use anyhow::Context;
use libc::pid_t;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Delivers the termination signal to a tracked process
pub trait Killer {
    /// Send an unconditional kill to `pid`.
    ///
    /// `Err(Errno::ESRCH)` means the process is already gone.
    fn kill(&mut self, pid: pid_t) -> nix::Result<()>;
}

/// Reads cumulative CPU counters of a process
pub trait CpuSource {
    /// Ticks spent in user and kernel mode since `pid` started.
    ///
    /// Must fail for a process that no longer exists instead of returning zeros.
    fn read(&mut self, pid: pid_t) -> Result<CpuTicks>;

    /// Clock ticks per second used by [`CpuSource::read`]
    fn ticks_per_second(&self) -> u64;
}

/// Sends `SIGKILL`, which cannot be caught or ignored
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalKiller;

impl Killer for SignalKiller {
    fn kill(&mut self, pid: pid_t) -> nix::Result<()> {
        signal::kill(Pid::from_raw(pid), Signal::SIGKILL)
    }
}

const FALLBACK_TICKS_PER_SECOND: u64 = 100;

/// Reads `utime`/`stime` from `/proc/<pid>/stat`
#[derive(Debug, Clone, Copy)]
pub struct ProcStat {
    ticks_per_second: u64,
}

impl ProcStat {
    pub fn new() -> Self {
        let ret = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let ticks_per_second = if ret > 0 {
            ret as u64
        } else {
            FALLBACK_TICKS_PER_SECOND
        };

        Self { ticks_per_second }
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for ProcStat {
    #[cfg(target_os = "linux")]
    fn read(&mut self, pid: pid_t) -> Result<CpuTicks> {
        let stat = procfs::process::Process::new(pid)
            .and_then(|process| process.stat())
            .with_context(|| format!("Failed to read /proc/{pid}/stat"))?;

        Ok(CpuTicks::new(stat.utime, stat.stime))
    }

    #[cfg(not(target_os = "linux"))]
    fn read(&mut self, pid: pid_t) -> Result<CpuTicks> {
        anyhow::bail!("Reading CPU counters of {pid} is only supported on Linux")
    }

    fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Above the kernel's PID_MAX_LIMIT, so never a live process
    const IMPOSSIBLE_PID: pid_t = 5_000_000;

    #[test]
    fn test_proc_stat_reads_own_process() {
        let mut source = ProcStat::new();
        let pid = std::process::id() as pid_t;
        assert!(source.read(pid).is_ok());
        assert!(source.ticks_per_second() > 0);
    }

    #[test]
    fn test_proc_stat_fails_for_missing_process() {
        let mut source = ProcStat::new();
        assert!(source.read(IMPOSSIBLE_PID).is_err());
    }

    #[test]
    fn test_kill_missing_process_is_esrch() {
        let mut killer = SignalKiller;
        assert_eq!(killer.kill(IMPOSSIBLE_PID), Err(nix::errno::Errno::ESRCH));
    }
}
