use anyhow::{Context, Error, Result, bail};
use libc::pid_t;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A process lifecycle notification, as delivered by the event source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Fork { parent: pid_t, child: pid_t },
    Exit { pid: pid_t },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Fork { parent, child } => write!(f, "fork {parent} {child}"),
            Event::Exit { pid } => write!(f, "exit {pid}"),
        }
    }
}

fn parse_pid(raw: Option<&str>, field: &str) -> Result<pid_t> {
    let raw = raw.with_context(|| format!("Missing {field} pid"))?;
    let pid = raw
        .parse::<pid_t>()
        .with_context(|| format!("Invalid {field} pid: '{raw}'"))?;
    if pid <= 0 {
        bail!("Invalid {field} pid: {pid}");
    }
    Ok(pid)
}

/// Parses either `fork <parent> <child>` / `exit <pid>`, or the same event as a JSON
/// object (`{"type":"exit","pid":42}`)
impl FromStr for Event {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON event: {line}"));
        }

        let mut fields = line.split_whitespace();
        let event = match fields.next() {
            Some("fork") => Event::Fork {
                parent: parse_pid(fields.next(), "parent")?,
                child: parse_pid(fields.next(), "child")?,
            },
            Some("exit") => Event::Exit {
                pid: parse_pid(fields.next(), "exiting")?,
            },
            Some(other) => bail!("Unknown event type: '{other}'"),
            None => bail!("Empty event"),
        };

        if let Some(extra) = fields.next() {
            bail!("Unexpected trailing field '{extra}' in event: {line}");
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("fork 10 11", Event::Fork { parent: 10, child: 11 })]
    #[case("  exit 42 ", Event::Exit { pid: 42 })]
    #[case("fork\t1\t2", Event::Fork { parent: 1, child: 2 })]
    #[case(r#"{"type":"fork","parent":3,"child":4}"#, Event::Fork { parent: 3, child: 4 })]
    #[case(r#"{"type":"exit","pid":5}"#, Event::Exit { pid: 5 })]
    fn test_parse_event(#[case] line: &str, #[case] expected: Event) {
        assert_eq!(line.parse::<Event>().unwrap(), expected);
    }

    #[rstest]
    #[case("", "Empty event")]
    #[case("spawn 1 2", "Unknown event type")]
    #[case("fork 1", "Missing child pid")]
    #[case("exit abc", "Invalid exiting pid")]
    #[case("exit 0", "Invalid exiting pid")]
    #[case("exit -3", "Invalid exiting pid")]
    #[case("exit 1 2", "Unexpected trailing field")]
    #[case(r#"{"type":"vfork","pid":5}"#, "Invalid JSON event")]
    fn test_parse_invalid_event(#[case] line: &str, #[case] message: &str) {
        let err = line.parse::<Event>().unwrap_err().to_string();
        assert!(
            err.contains(message),
            "Expected error containing '{message}', got: {err}"
        );
    }

    #[test]
    fn test_display_matches_line_format() {
        let event = Event::Fork {
            parent: 7,
            child: 8,
        };
        assert_eq!(event.to_string().parse::<Event>().unwrap(), event);
    }
}
