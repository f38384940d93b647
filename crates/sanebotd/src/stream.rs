//! Live event stream adapter.
//!
//! Wraps the persistent streaming subprocess into a lazy sequence of
//! decoded events. The sequence is effectively infinite; it ends only when
//! the underlying connection closes, which is fatal to the run.

use anyhow::{bail, Context, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use sanebot_core::{decode_stream_line, StreamEvent};

pub struct EventStream {
    // Held so the connection stays open for the life of the stream.
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl EventStream {
    /// Spawn the streaming subprocess. Failure to start is fatal.
    pub fn connect(argv: &[String]) -> Result<Self> {
        let (exe, args) = argv.split_first().context("empty stream command")?;
        let mut child = Command::new(exe)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start event stream: {argv:?}"))?;
        let stdout = child
            .stdout
            .take()
            .context("event stream has no stdout")?;
        debug!(command = ?argv, "event stream connected");
        Ok(Self {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Block until the next recognized event arrives.
    ///
    /// Unrecognized kinds are skipped here; a malformed line or a closed
    /// connection surfaces as an error and ends the run.
    pub async fn next_event(&mut self) -> Result<StreamEvent> {
        loop {
            let line = match self.lines.next_line().await? {
                Some(line) => line,
                None => bail!("event stream connection closed"),
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(event) = decode_stream_line(&line)? {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_stream_decodes_lines_then_reports_close() {
        // printf stands in for the remote stream: two lines, then EOF.
        let mut stream = EventStream::connect(&argv(&[
            "printf",
            r#"{"type":"ref-updated","refUpdate":{"project":"demo","refName":"refs/heads/master"}}\n{"type":"unknown-kind"}\n"#,
        ]))
        .unwrap();

        let event = stream.next_event().await.unwrap();
        assert!(matches!(event, StreamEvent::RefUpdated { project } if project == "demo"));

        // The unknown kind is skipped, then EOF turns into an error.
        let err = stream.next_event().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let mut stream = EventStream::connect(&argv(&["printf", "not json\\n"])).unwrap();
        assert!(stream.next_event().await.is_err());
    }

    #[test]
    fn test_unstartable_stream_is_fatal() {
        assert!(EventStream::connect(&argv(&["/nonexistent/stream-tool"])).is_err());
    }
}
