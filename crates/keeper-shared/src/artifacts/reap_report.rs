use libc::pid_t;
use serde::{Deserialize, Serialize};

/// Outcome of monitoring one job: whether its tree was fully reaped, and the CPU
/// time it consumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReapReport {
    pub watched_pid: pid_t,
    pub trigger_pid: pid_t,
    /// False when the monitor stopped before every descendant's exit was seen
    pub complete: bool,
    pub sweeps: u32,
    pub user_ticks: u64,
    pub system_ticks: u64,
    pub ticks_per_second: u64,
    pub user_secs: f64,
    pub system_secs: f64,
}
impl super::ArtifactExt for ReapReport {}
