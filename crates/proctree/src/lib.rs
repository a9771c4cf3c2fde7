//! Process-tree tracking and reaping for a privilege-separation monitor.
//!
//! A [`Session`] owns the [`ProcessTree`] of one watched job. The embedding program
//! feeds it fork/exit [`Event`]s one at a time; when the watched process exits, every
//! descendant is sent `SIGKILL`, and CPU time of the whole tree is accounted for.

pub mod events;
pub mod probe;
pub mod session;
pub mod tree;
pub mod usage;

#[cfg(test)]
mod testing;

pub use events::Event;
pub use probe::{CpuSource, Killer, ProcStat, SignalKiller};
pub use session::{Session, SessionError, SessionSummary};
pub use tree::{ORPHAN_PARENT, ProcessTree};
pub use usage::{CpuTicks, CpuUsage};
