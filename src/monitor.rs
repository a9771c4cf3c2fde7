use crate::prelude::*;
use keeper_shared::artifacts::ReapReport;
use proctree::{CpuSource, Event, Killer, Session, SessionSummary};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Drive an initialized session from `events` until the watched tree is fully reaped.
///
/// CPU usage is sampled whenever `sample_interval` elapses, whether or not events keep
/// coming. If the event stream ends first, the monitor can no longer see new
/// descendants: the tree is swept one last time and the session is finalized
/// incomplete.
pub fn run<K: Killer, C: CpuSource>(
    session: &mut Session<K, C>,
    events: Receiver<Event>,
    sample_interval: Duration,
) -> Result<SessionSummary> {
    let mut last_sample = Instant::now();
    let mut handled = 0usize;

    while !session.is_done()? {
        let timeout = sample_interval.saturating_sub(last_sample.elapsed());
        match events.recv_timeout(timeout) {
            Ok(event) => {
                session.apply(&event)?;
                handled += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                let watched = session.tree()?.watched();
                warn!("Event stream closed before the tree of pid {watched} was reaped");
                session.shoot_tree()?;
                break;
            }
        }

        if last_sample.elapsed() >= sample_interval {
            session.sample_and_log_usage()?;
            last_sample = Instant::now();
        }
    }

    debug!("Handled {handled} events");
    session.sample_and_log_usage()?;
    Ok(session.finalize()?)
}

pub fn to_report(summary: &SessionSummary) -> ReapReport {
    let usage = summary.usage();
    ReapReport {
        watched_pid: summary.watched,
        trigger_pid: summary.trigger,
        complete: summary.complete,
        sweeps: summary.sweeps,
        user_ticks: summary.ticks.user,
        system_ticks: summary.ticks.system,
        ticks_per_second: summary.ticks_per_second,
        user_secs: usage.user.as_secs_f64(),
        system_secs: usage.system.as_secs_f64(),
    }
}
