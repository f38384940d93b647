//! Event classification, deduplication and filtering.
//!
//! The dispatcher owns the run's only mutable filtering state: the set of
//! patch-set refs already handled. State is constructed fresh per run and
//! passed nowhere else; a restart legitimately reprocesses refs.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sanebot_core::{ExclusionList, ReviewTask, StreamEvent};
use tracing::debug;

/// What the agent should do with one admitted event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Fetch, run the workers, publish the merged verdict.
    Review(ReviewTask),

    /// Publish the fixed skip verdict; no mirror or worker interaction.
    Excluded(ReviewTask),

    /// Drop the cached mainline fetch specs for the project.
    InvalidateMainline(String),

    /// Reply pointing at the server's native move support.
    MoveReply { task: ReviewTask, branch: String },

    /// Nothing to do: dedup hit, unrecognized kind, or a plain comment.
    Skip,
}

pub struct Dispatcher {
    processed: HashSet<String>,
    excluded: ExclusionList,
}

impl Dispatcher {
    pub fn new(excluded: ExclusionList) -> Self {
        Self {
            processed: HashSet::new(),
            excluded,
        }
    }

    /// Classify one live event.
    pub fn dispatch(&mut self, event: StreamEvent) -> Action {
        match event {
            StreamEvent::PatchSetCreated { task } => self.admit(task),
            StreamEvent::RefUpdated { project } => Action::InvalidateMainline(project),
            StreamEvent::CommentAdded { task, comment } => match parse_move_command(&comment) {
                Some(branch) => Action::MoveReply { task, branch },
                None => Action::Skip,
            },
        }
    }

    /// Admit a review candidate from either feed: dedup on the patch-set
    /// ref, then apply the exclusion rules.
    pub fn admit(&mut self, task: ReviewTask) -> Action {
        // Marked before any downstream work, so the at-most-once guarantee
        // holds even when a later stage fails.
        if !self.processed.insert(task.patch_set.ref_name.clone()) {
            return Action::Skip;
        }
        if self
            .excluded
            .excludes(&task.change.project, &task.change.branch)
        {
            debug!(
                project = %task.change.project,
                branch = %task.change.branch,
                "project/branch excluded"
            );
            return Action::Excluded(task);
        }
        Action::Review(task)
    }
}

fn move_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:gerrit-bot:\s*)?\bmove\s+(?:back\s+)?to\s+(?:branch\s+)?(\S+)").unwrap()
    })
}

/// Parse the legacy move command out of a review comment.
pub fn parse_move_command(comment: &str) -> Option<String> {
    move_pattern()
        .captures(comment)
        .map(|captures| captures[1].to_string())
}
