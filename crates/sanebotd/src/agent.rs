//! The agent's control loop.
//!
//! Strictly serial: one change is fully processed (mirror fetch, every
//! worker in series, merge, invite, submission) before the next event is
//! read from either feed. The only suspension points are the blocking
//! waits on the stream, the subprocesses, and the submission calls; there
//! is no agent-level timeout or cancellation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use sanebot_core::{skip_fragment, ReviewInput, ReviewTask, StreamEvent};
use sanebot_workers::{oversized_fragment, run_worker, CommandHost, WorkerOutcome};

use crate::config::AgentConfig;
use crate::dispatch::{Action, Dispatcher};
use crate::mirror::{GitMirrorCache, MirrorError};
use crate::publish::{ReviewPublisher, ReviewSink};
use crate::snapshot;
use crate::stream::EventStream;

/// Pause between connecting the live stream and firing the snapshot query.
/// Gives the stream a moment to establish so events raced during startup
/// end up buffered in its pipe. Best-effort by design; the dedup set
/// squashes whatever overlaps.
pub const STREAM_WARMUP: Duration = Duration::from_secs(5);

/// Reply for the retired move command.
const MOVE_REPLY: &str = "This bot no longer moves changes between branches. \
                          Please use the server's own Move operation instead.";

pub struct Agent {
    config: AgentConfig,
    dispatcher: Dispatcher,
    mirrors: GitMirrorCache,
    publisher: ReviewPublisher,
    host: Arc<dyn CommandHost>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        host: Arc<dyn CommandHost>,
        sink: Arc<dyn ReviewSink>,
    ) -> Self {
        let dispatcher = Dispatcher::new(config.excluded.clone());
        let mirrors = GitMirrorCache::new(
            config.mirror_dir.clone(),
            config.remote_base(),
            host.clone(),
        );
        let publisher =
            ReviewPublisher::new(sink, host.clone(), config.ssh_base(), config.invite_only);
        Self {
            config,
            dispatcher,
            mirrors,
            publisher,
            host,
        }
    }

    /// Run until a fatal error: connect the stream, give it a moment,
    /// drain the snapshot, then follow live events forever.
    pub async fn run(mut self) -> Result<()> {
        let mut stream = EventStream::connect(&self.config.stream_argv())?;
        tokio::time::sleep(STREAM_WARMUP).await;
        self.drain_snapshot().await?;
        loop {
            let event = stream.next_event().await?;
            self.handle_event(event).await?;
        }
    }

    /// Process every open change from the startup snapshot.
    pub async fn drain_snapshot(&mut self) -> Result<()> {
        let tasks = snapshot::scan(
            self.host.as_ref(),
            &self.config.query_argv(),
            &self.config.bot_email,
        )
        .await?;
        info!(count = tasks.len(), "processing startup snapshot");
        for task in tasks {
            let action = self.dispatcher.admit(task);
            self.perform(action).await?;
        }
        Ok(())
    }

    /// Process one live event.
    pub async fn handle_event(&mut self, event: StreamEvent) -> Result<()> {
        let action = self.dispatcher.dispatch(event);
        self.perform(action).await
    }

    async fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Skip => Ok(()),
            Action::InvalidateMainline(project) => {
                self.mirrors.invalidate(&project);
                Ok(())
            }
            Action::MoveReply { task, branch } => {
                info!(change = task.change.number, branch = %branch, "move command received, replying");
                self.publisher.reply(&task, MOVE_REPLY).await;
                Ok(())
            }
            Action::Excluded(task) => {
                let review = ReviewInput::from_fragments(vec![skip_fragment()])?;
                self.publisher.publish(&task, &review, &[]).await;
                Ok(())
            }
            Action::Review(task) => self.review(task).await,
        }
    }

    /// The full per-change pipeline: fetch, workers in series, merge,
    /// publish.
    async fn review(&mut self, task: ReviewTask) -> Result<()> {
        info!(
            change = task.change.number,
            project = %task.change.project,
            branch = %task.change.branch,
            revision = %task.patch_set.revision,
            "reviewing patch set"
        );

        if self.config.fetch {
            match self.mirrors.fetch_change(&task).await {
                Ok(()) => {}
                Err(err @ MirrorError::Init { .. }) => return Err(err.into()),
                Err(err @ MirrorError::Fetch { .. }) => {
                    // The ref stays marked processed; this revision is
                    // skipped rather than reviewed against stale content.
                    warn!(
                        change = task.change.number,
                        error = %err,
                        "mirror fetch failed, skipping review"
                    );
                    return Ok(());
                }
            }
        }

        let mut fragments = Vec::new();
        let mut invites = Vec::new();
        for spec in self.config.workers.iter() {
            match run_worker(self.host.as_ref(), spec, &task).await? {
                WorkerOutcome::Fragment {
                    fragment,
                    invites: mut found,
                } => {
                    fragments.push(fragment);
                    invites.append(&mut found);
                }
                WorkerOutcome::Oversized { bytes } => {
                    fragments.push(oversized_fragment(&spec.name, bytes));
                    invites.extend(self.config.maintainers.iter().cloned());
                }
            }
        }

        let review = ReviewInput::from_fragments(fragments)?;
        debug!(change = task.change.number, notify = ?review.notify, "verdict merged");
        self.publisher.publish(&task, &review, &invites).await;
        Ok(())
    }
}
