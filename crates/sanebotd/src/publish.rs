//! Verdict submission and reviewer invites.
//!
//! Two independent, best-effort operations per change. Neither failure is
//! ever fatal: a lost review or invite is logged with full context and the
//! run moves on to the next event.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, error, warn};

use sanebot_core::{Change, NotifyScope, ReviewInput, ReviewTask, REVIEW_TAG};
use sanebot_workers::CommandHost;

/// Transport for posting a merged verdict against one revision.
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn post_review(
        &self,
        change: &Change,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<()>;
}

/// REST sink against the server's per-revision review endpoint.
pub struct RestSink {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl RestSink {
    pub fn new(base_url: String, user: String, password: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            user,
            password,
        }
    }

    fn review_url(&self, change: &Change, revision: &str) -> String {
        // Change id triplet; the separators inside project and branch
        // names must not collide with the URL structure.
        let project = change.project.replace('/', "%2F");
        let branch = change.branch.replace('/', "%2F");
        format!(
            "{}/a/changes/{}~{}~{}/revisions/{}/review",
            self.base_url.trim_end_matches('/'),
            project,
            branch,
            change.number,
            revision,
        )
    }
}

#[async_trait]
impl ReviewSink for RestSink {
    async fn post_review(
        &self,
        change: &Change,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<()> {
        let url = self.review_url(change, revision);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(review)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            bail!("review endpoint returned {status}");
        }
        Ok(())
    }
}

/// Publishes verdicts and invites for one run.
pub struct ReviewPublisher {
    sink: Arc<dyn ReviewSink>,
    host: Arc<dyn CommandHost>,
    ssh_base: Vec<String>,
    invite_only: bool,
}

impl ReviewPublisher {
    pub fn new(
        sink: Arc<dyn ReviewSink>,
        host: Arc<dyn CommandHost>,
        ssh_base: Vec<String>,
        invite_only: bool,
    ) -> Self {
        Self {
            sink,
            host,
            ssh_base,
            invite_only,
        }
    }

    /// Invite the accumulated reviewers, then submit the verdict.
    pub async fn publish(&self, task: &ReviewTask, review: &ReviewInput, invites: &[String]) {
        if !invites.is_empty() {
            self.invite(task, invites).await;
        }
        if self.invite_only {
            debug!(change = task.change.number, "invite-only mode, verdict not submitted");
            return;
        }
        self.submit(task, review).await;
    }

    /// Post an informational message-only reply on a change.
    pub async fn reply(&self, task: &ReviewTask, message: &str) {
        let review = ReviewInput {
            message: Some(message.to_string()),
            labels: serde_json::Map::new(),
            comments: serde_json::Map::new(),
            tag: REVIEW_TAG.to_string(),
            notify: NotifyScope::All,
        };
        self.submit(task, &review).await;
    }

    async fn submit(&self, task: &ReviewTask, review: &ReviewInput) {
        if let Err(e) = self
            .sink
            .post_review(&task.change, &task.patch_set.revision, review)
            .await
        {
            error!(
                change = task.change.number,
                project = %task.change.project,
                revision = %task.patch_set.revision,
                error = %e,
                "review submission failed"
            );
        }
    }

    /// Add reviewers through the privileged command transport, one `--add`
    /// per invitee.
    async fn invite(&self, task: &ReviewTask, invites: &[String]) {
        let mut argv = self.ssh_base.clone();
        argv.extend(
            [
                "gerrit".to_string(),
                "set-reviewers".to_string(),
                "--project".to_string(),
                task.change.project.clone(),
            ],
        );
        for invitee in invites {
            argv.push("--add".to_string());
            argv.push(invitee.clone());
        }
        argv.push(task.change.number.to_string());

        match self.host.run(&argv, None).await {
            Ok(output) if output.success() => {
                debug!(change = task.change.number, count = invites.len(), "reviewers invited");
            }
            Ok(output) => warn!(
                change = task.change.number,
                code = ?output.code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "reviewer invite failed"
            ),
            Err(e) => warn!(
                change = task.change.number,
                error = %e,
                "reviewer invite failed to start"
            ),
        }
    }
}
