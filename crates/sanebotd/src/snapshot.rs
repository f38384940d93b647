//! One-shot snapshot of currently open changes.
//!
//! Executed once at startup, after the live stream is connected, and fully
//! drained before any buffered live event is handled. Overlap between the
//! snapshot and early live events is resolved by the dispatcher's dedup
//! set; changes the bot already voted on are filtered out here.

use anyhow::{bail, Context, Result};
use tracing::debug;

use sanebot_core::{decode_snapshot_line, ReviewTask};
use sanebot_workers::CommandHost;

/// Run the snapshot query and return the open changes still needing the
/// bot's attention.
pub async fn scan(
    host: &dyn CommandHost,
    argv: &[String],
    bot_email: &str,
) -> Result<Vec<ReviewTask>> {
    let output = host
        .run(argv, None)
        .await
        .with_context(|| format!("failed to start snapshot query: {argv:?}"))?;
    if !output.success() {
        bail!("snapshot query exited with {:?}", output.code);
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut tasks = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(change) = decode_snapshot_line(line)? else {
            continue;
        };
        if change.approved_by(bot_email) {
            // Already carries our vote; this is a filter, not a dedup entry.
            debug!(project = %change.project, number = change.number, "already reviewed, skipping");
            continue;
        }
        if let Some(task) = change.into_task() {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sanebot_workers::HostOutput;
    use std::io;
    use std::path::Path;

    struct FixedHost(HostOutput);

    #[async_trait]
    impl CommandHost for FixedHost {
        async fn run(&self, _argv: &[String], _cwd: Option<&Path>) -> io::Result<HostOutput> {
            Ok(self.0.clone())
        }
    }

    fn host(code: Option<i32>, stdout: &str) -> FixedHost {
        FixedHost(HostOutput {
            code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }

    const SNAPSHOT: &str = concat!(
        r#"{"project":"demo","branch":"master","number":1,"currentPatchSet":{"ref":"refs/changes/01/1/1","revision":"aaaa"}}"#,
        "\n",
        r#"{"project":"demo","branch":"master","number":2,"currentPatchSet":{"ref":"refs/changes/02/2/1","revision":"bbbb","approvals":[{"type":"Sanity-Review","by":{"email":"bot@example.org"}}]}}"#,
        "\n",
        r#"{"project":"demo","branch":"master","number":3}"#,
        "\n",
        r#"{"type":"stats","rowCount":3}"#,
        "\n",
    );

    #[tokio::test]
    async fn test_scan_filters_voted_and_patchsetless_rows() {
        let tasks = scan(&host(Some(0), SNAPSHOT), &["query".to_string()], "bot@example.org")
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].change.number, 1);
    }

    #[tokio::test]
    async fn test_scan_fails_on_query_error() {
        let err = scan(&host(Some(1), ""), &["query".to_string()], "bot@example.org")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("snapshot query"));
    }

    #[tokio::test]
    async fn test_scan_fails_on_malformed_row() {
        let result = scan(
            &host(Some(0), "garbage\n"),
            &["query".to_string()],
            "bot@example.org",
        )
        .await;
        assert!(result.is_err());
    }
}
