use crate::events::Event;
use crate::probe::{CpuSource, Killer, ProcStat, SignalKiller};
use crate::tree::ProcessTree;
use crate::usage::{CpuTicks, CpuUsage};
use libc::pid_t;
use log::{error, info};

/// Misuse of the [`Session`] protocol by its caller
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A monitoring session is already active for pid {watched}")]
    AlreadyActive { watched: pid_t },

    #[error("No monitoring session is active")]
    NoSession,

    #[error("The tree of pid {watched} is fully reaped, finalize the session")]
    Completed { watched: pid_t },
}

/// Final state of a torn down session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub watched: pid_t,
    pub trigger: pid_t,
    /// Whether every tracked process was confirmed dead before teardown
    pub complete: bool,
    pub ticks: CpuTicks,
    pub ticks_per_second: u64,
    pub sweeps: u32,
}

impl SessionSummary {
    pub fn usage(&self) -> CpuUsage {
        self.ticks.to_usage(self.ticks_per_second)
    }
}

/// Owns the [`ProcessTree`] of the monitored job between `initialize` and `finalize`.
///
/// Calls must be serialized by the caller: the session does no locking.
pub struct Session<K = SignalKiller, C = ProcStat> {
    tree: Option<ProcessTree<K, C>>,
}

impl<K, C> Default for Session<K, C> {
    fn default() -> Self {
        Self { tree: None }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring `watched` with real process probes
    pub fn initialize(&mut self, watched: pid_t, trigger: pid_t) -> Result<(), SessionError> {
        self.initialize_with(watched, trigger, SignalKiller, ProcStat::new())
    }
}

impl<K: Killer, C: CpuSource> Session<K, C> {
    pub fn initialize_with(
        &mut self,
        watched: pid_t,
        trigger: pid_t,
        killer: K,
        cpu: C,
    ) -> Result<(), SessionError> {
        if let Some(tree) = &self.tree {
            return Err(SessionError::AlreadyActive {
                watched: tree.watched(),
            });
        }

        info!("Started monitoring pid {watched} (trigger pid {trigger})");
        self.tree = Some(ProcessTree::with_probes(watched, trigger, killer, cpu));
        Ok(())
    }

    pub fn on_fork(&mut self, parent: pid_t, child: pid_t) -> Result<(), SessionError> {
        self.tracking_tree()?.fork(parent, child);
        Ok(())
    }

    pub fn on_exit(&mut self, pid: pid_t) -> Result<(), SessionError> {
        self.tracking_tree()?.exit(pid);
        Ok(())
    }

    pub fn apply(&mut self, event: &Event) -> Result<(), SessionError> {
        match *event {
            Event::Fork { parent, child } => self.on_fork(parent, child),
            Event::Exit { pid } => self.on_exit(pid),
        }
    }

    /// Force a sweep, e.g. when the event stream is lost
    pub fn shoot_tree(&mut self) -> Result<usize, SessionError> {
        Ok(self.tree_mut()?.shoot_tree())
    }

    /// Refresh CPU samples of the tree and log the running totals
    pub fn sample_and_log_usage(&mut self) -> Result<CpuUsage, SessionError> {
        let tree = self.tree_mut()?;
        tree.sample_usage();
        let usage = tree.usage();
        info!(
            "CPU usage of pid {} tree: {usage} ({} live)",
            tree.watched(),
            tree.live_count()
        );
        Ok(usage)
    }

    pub fn usage(&self) -> Result<CpuUsage, SessionError> {
        Ok(self.tree()?.usage())
    }

    pub fn is_done(&self) -> Result<bool, SessionError> {
        Ok(self.tree()?.is_done())
    }

    pub fn is_active(&self) -> bool {
        self.tree.is_some()
    }

    pub fn tree(&self) -> Result<&ProcessTree<K, C>, SessionError> {
        self.tree.as_ref().ok_or(SessionError::NoSession)
    }

    fn tree_mut(&mut self) -> Result<&mut ProcessTree<K, C>, SessionError> {
        self.tree.as_mut().ok_or(SessionError::NoSession)
    }

    /// The tree, as long as it still accepts fork/exit events
    fn tracking_tree(&mut self) -> Result<&mut ProcessTree<K, C>, SessionError> {
        let tree = self.tree_mut()?;
        if tree.is_done() {
            return Err(SessionError::Completed {
                watched: tree.watched(),
            });
        }
        Ok(tree)
    }

    /// Tear the session down.
    ///
    /// Finalizing before the whole tree is reaped may leak a privileged process; it is
    /// logged but teardown still happens.
    pub fn finalize(&mut self) -> Result<SessionSummary, SessionError> {
        let tree = self.tree.take().ok_or(SessionError::NoSession)?;

        let complete = tree.is_done();
        if !complete {
            error!(
                "Finalizing without finishing killing the pid {} tree ({} still live: {:?})",
                tree.watched(),
                tree.live_count(),
                tree.tracked_pids()
            );
        }

        let summary = SessionSummary {
            watched: tree.watched(),
            trigger: tree.trigger(),
            complete,
            ticks: tree.usage_ticks(),
            ticks_per_second: tree.ticks_per_second(),
            sweeps: tree.sweep_count(),
        };
        info!(
            "Finished monitoring pid {}, CPU {}",
            summary.watched,
            summary.usage()
        );

        Ok(summary)
    }
}
