use crate::probe::{CpuSource, Killer, ProcStat, SignalKiller};
use crate::usage::{CpuTicks, CpuUsage};
use itertools::Itertools;
use libc::pid_t;
use log::{debug, error, info, trace, warn};
use nix::errno::Errno;
use std::collections::{HashMap, HashSet};


/// Stand-in parent of orphaned processes, like the kernel reparenting them to init
pub const ORPHAN_PARENT: pid_t = 1;

/// Lineage, termination and CPU accounting for the process tree of one watched job.
///
/// The tree is built from fork/exit notifications delivered one at a time, in any
/// order. Processes whose ancestry can't be traced back to the watched pid are
/// ignored for good. Once the watched (or trigger) process exits, every tracked
/// descendant is killed, and any descendant that shows up later is killed as soon as
/// its fork is recorded.
pub struct ProcessTree<K = SignalKiller, C = ProcStat> {
    watched: pid_t,
    /// Exit of this pid also shoots the tree (e.g. a setuid wrapper around `watched`)
    trigger: pid_t,

    /// Map of parent PID to its forked children, in fork order
    children: HashMap<pid_t, Vec<pid_t>>,
    /// Map of child PID to its current parent PID
    parents: HashMap<pid_t, pid_t>,
    ignored: HashSet<pid_t>,

    live_procs: u32,
    watched_exited: bool,
    started_shooting: bool,
    sweeps: u32,

    /// Last cumulative reading per pid, never pruned
    samples: HashMap<pid_t, CpuTicks>,
    /// Ticks folded in from pids whose counters went backwards
    dead: CpuTicks,

    killer: K,
    cpu: C,
}

impl<K: Killer, C: CpuSource> ProcessTree<K, C> {
    pub fn with_probes(watched: pid_t, trigger: pid_t, killer: K, cpu: C) -> Self {
        debug!("Watching pid {watched} (trigger pid {trigger})");
        Self {
            watched,
            trigger,
            children: HashMap::new(),
            parents: HashMap::new(),
            ignored: HashSet::new(),
            live_procs: 1,
            watched_exited: false,
            started_shooting: false,
            sweeps: 0,
            samples: HashMap::new(),
            dead: CpuTicks::default(),
            killer,
            cpu,
        }
    }

    /// Record that `parent` forked `child`
    pub fn fork(&mut self, parent: pid_t, child: pid_t) {
        if self.ignored.contains(&parent) {
            trace!("FORK {parent} -> {child} (ignored parent)");
            return;
        }

        if parent != ORPHAN_PARENT && self.children.contains_key(&parent) {
            trace!("FORK {parent} -> {child}");
            self.children.entry(parent).or_default().push(child);
            self.parents.insert(child, parent);
            self.live_procs += 1;
        } else if self.parents.contains_key(&parent) || parent == self.watched {
            trace!("FORK {parent} -> {child} (first child)");
            self.record_new(parent, child);
        } else {
            trace!("FORK {parent} -> {child} outside of the watched tree");
            for pid in [parent, child] {
                self.retire_sample(pid);
                self.ignored.insert(pid);
            }
            return;
        }

        // The fork raced with the sweep, shoot again so the newcomer doesn't escape
        if self.started_shooting {
            self.shoot_tree();
        }
    }

    /// Drop the CPU sample of a pid that now names an unrelated process, keeping the
    /// ticks it accumulated while it was part of the tree
    fn retire_sample(&mut self, pid: pid_t) {
        if let Some(sample) = self.samples.remove(&pid) {
            trace!("Retiring CPU sample of reused pid {pid}");
            self.dead += sample;
        }
    }

    fn record_new(&mut self, parent: pid_t, child: pid_t) {
        self.children.insert(parent, vec![child]);
        self.parents.insert(child, parent);
        self.live_procs += 1;
    }

    /// Record the exit of `pid`
    pub fn exit(&mut self, pid: pid_t) {
        if pid == self.trigger || pid == self.watched {
            let which = if pid == self.watched {
                "watched"
            } else {
                "trigger"
            };
            debug!("EXIT {pid} ({which} process)");
            self.shoot_tree();
        }
        if pid == self.watched {
            if self.watched_exited {
                warn!("Exit of watched pid {pid} reported twice");
            } else {
                self.watched_exited = true;
                self.decrement_live(pid);
            }
        }

        if self.ignored.remove(&pid) {
            return;
        }

        let had_children = match self.children.remove(&pid) {
            Some(orphans) => {
                for orphan in orphans {
                    if let Some(parent) = self.parents.get_mut(&orphan) {
                        trace!("REPARENT {orphan} -> {ORPHAN_PARENT}");
                        *parent = ORPHAN_PARENT;
                    }
                }
                true
            }
            None => false,
        };

        match self.parents.remove(&pid) {
            Some(parent) => {
                trace!("EXIT {pid} PARENT {parent}");
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|&sibling| sibling != pid);
                }
                if pid != self.watched {
                    self.decrement_live(pid);
                }
            }
            None if had_children && pid != self.watched => {
                trace!("EXIT {pid}");
                self.decrement_live(pid);
            }
            None => {}
        }
    }

    fn decrement_live(&mut self, pid: pid_t) {
        match self.live_procs.checked_sub(1) {
            Some(live) => self.live_procs = live,
            None => warn!("Exit of pid {pid} recorded with no live process left"),
        }
    }

    /// Kill every tracked descendant, returning how many pids were signalled.
    ///
    /// Safe to call any number of times; every call sweeps the pids known right now.
    pub fn shoot_tree(&mut self) -> usize {
        if !self.started_shooting {
            info!("Shooting the process tree of pid {}", self.watched);
        }
        self.started_shooting = true;
        self.sweeps += 1;

        let targets = self
            .parents
            .keys()
            .copied()
            .filter(|&pid| pid != ORPHAN_PARENT)
            .sorted()
            .collect::<Vec<_>>();

        for &pid in &targets {
            match self.killer.kill(pid) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => error!("Failed to kill {pid}: {err}"),
            }
        }

        if !targets.is_empty() {
            debug!(
                "Cleaned all processes associated with {} ({} signalled)",
                self.watched,
                targets.len()
            );
        }
        info!(
            "Tree of pid {} (trigger {}) terminated, CPU {}",
            self.watched,
            self.trigger,
            self.usage()
        );

        targets.len()
    }

    /// Refresh the CPU sample of every pid ever tracked as a descendant
    pub fn sample_usage(&mut self) {
        let pids = self
            .parents
            .keys()
            .chain(self.samples.keys())
            .copied()
            .filter(|&pid| pid != ORPHAN_PARENT && !self.ignored.contains(&pid))
            .unique()
            .collect::<Vec<_>>();

        for pid in pids {
            let fresh = match self.cpu.read(pid) {
                Ok(ticks) => ticks,
                Err(err) => {
                    trace!("Skipping CPU sample of {pid}: {err:#}");
                    continue;
                }
            };

            match self.samples.get_mut(&pid) {
                None => {
                    self.samples.insert(pid, fresh);
                }
                Some(previous) => {
                    // A counter going backwards means the pid now names another process
                    if fresh.user < previous.user {
                        self.dead.user += previous.user;
                    }
                    if fresh.system < previous.system {
                        self.dead.system += previous.system;
                    }
                    *previous = fresh;
                }
            }
        }
    }

    /// Total CPU ticks consumed by the tree so far, dead processes included
    pub fn usage_ticks(&self) -> CpuTicks {
        self.dead + self.samples.values().copied().sum::<CpuTicks>()
    }

    pub fn usage(&self) -> CpuUsage {
        self.usage_ticks().to_usage(self.cpu.ticks_per_second())
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.cpu.ticks_per_second()
    }

    /// Whether the watched process and every tracked descendant have exited
    pub fn is_done(&self) -> bool {
        self.live_procs == 0
    }

    pub fn watched(&self) -> pid_t {
        self.watched
    }

    pub fn trigger(&self) -> pid_t {
        self.trigger
    }

    pub fn live_count(&self) -> u32 {
        self.live_procs
    }

    pub fn is_shooting(&self) -> bool {
        self.started_shooting
    }

    /// Number of sweeps run so far
    pub fn sweep_count(&self) -> u32 {
        self.sweeps
    }

    pub fn parent_of(&self, pid: pid_t) -> Option<pid_t> {
        self.parents.get(&pid).copied()
    }

    pub fn children_of(&self, pid: pid_t) -> Option<&[pid_t]> {
        self.children.get(&pid).map(Vec::as_slice)
    }

    pub fn is_ignored(&self, pid: pid_t) -> bool {
        self.ignored.contains(&pid)
    }

    /// Descendants currently holding a parent edge, in ascending order
    pub fn tracked_pids(&self) -> Vec<pid_t> {
        self.parents.keys().copied().sorted().collect()
    }

    pub fn killer(&self) -> &K {
        &self.killer
    }

    pub fn cpu_source_mut(&mut self) -> &mut C {
        &mut self.cpu
    }
}
