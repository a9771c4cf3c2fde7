use crate::prelude::*;
use proctree::Event;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};

/// Read fork/exit notifications from stdin, or from `path` when given
pub fn open(path: Option<&Path>) -> Result<Receiver<Event>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open event stream {}", path.display()))?;
            debug!("Reading events from {}", path.display());
            Ok(spawn_reader(BufReader::new(file)))
        }
        None => {
            debug!("Reading events from stdin");
            Ok(spawn_reader(BufReader::new(std::io::stdin())))
        }
    }
}

/// Parse one event per line on a background thread.
///
/// The receiver is disconnected once the input ends. Blank lines and `#` comments are
/// skipped; malformed lines are logged and dropped so one bad line can't stall the
/// monitor.
pub fn spawn_reader<R: BufRead + Send + 'static>(reader: R) -> Receiver<Event> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read the event stream: {e}");
                    break;
                }
            };

            let Some(parsed) = parse_line(&line) else {
                continue;
            };
            match parsed {
                Ok(event) => {
                    trace!("Received {event}");
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Skipping line {}: {e:#}", index + 1),
            }
        }
        debug!("Event stream closed");
    });

    rx
}

fn parse_line(line: &str) -> Option<Result<Event>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse())
}
