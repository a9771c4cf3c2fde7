use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Raw cumulative CPU time, in clock ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
}

impl CpuTicks {
    pub fn new(user: u64, system: u64) -> Self {
        Self { user, system }
    }

    /// Convert to wall units using the platform's ticks-per-second rate
    pub fn to_usage(self, ticks_per_second: u64) -> CpuUsage {
        CpuUsage {
            user: ticks_to_duration(self.user, ticks_per_second),
            system: ticks_to_duration(self.system, ticks_per_second),
        }
    }
}

impl Add for CpuTicks {
    type Output = CpuTicks;

    fn add(self, rhs: Self) -> Self::Output {
        CpuTicks {
            user: self.user.saturating_add(rhs.user),
            system: self.system.saturating_add(rhs.system),
        }
    }
}

impl AddAssign for CpuTicks {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for CpuTicks {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CpuTicks::default(), Add::add)
    }
}

/// CPU time consumed by a tree, split between user and kernel mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuUsage {
    pub user: Duration,
    pub system: Duration,
}

impl std::fmt::Display for CpuUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user {:.2}s system {:.2}s",
            self.user.as_secs_f64(),
            self.system.as_secs_f64()
        )
    }
}

fn ticks_to_duration(ticks: u64, ticks_per_second: u64) -> Duration {
    if ticks_per_second == 0 {
        return Duration::ZERO;
    }
    let secs = ticks / ticks_per_second;
    let rem = ticks % ticks_per_second;
    Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / ticks_per_second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_usage() {
        let usage = CpuTicks::new(250, 100).to_usage(100);
        assert_eq!(usage.user, Duration::from_millis(2500));
        assert_eq!(usage.system, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_tick_rate_yields_zero() {
        let usage = CpuTicks::new(250, 100).to_usage(0);
        assert_eq!(usage, CpuUsage::default());
    }

    #[test]
    fn test_sum_of_ticks() {
        let total: CpuTicks = [CpuTicks::new(1, 2), CpuTicks::new(10, 20)]
            .into_iter()
            .sum();
        assert_eq!(total, CpuTicks::new(11, 22));
    }

    #[test]
    fn test_display() {
        let usage = CpuTicks::new(150, 5).to_usage(100);
        assert_eq!(usage.to_string(), "user 1.50s system 0.05s");
    }
}
