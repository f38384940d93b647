//! sanebot Core Library
//!
//! Domain model for the sanity-review agent: decoding of the review
//! server's line-oriented JSON feeds, change identity and normalization,
//! exclusion rules, and the recursive verdict merge.

pub mod change;
pub mod error;
pub mod event;
pub mod merge;
pub mod review;
pub mod rules;

pub use change::{normalize_project, Change, PatchSet, ReviewTask};
pub use error::{BotError, Result};
pub use event::{decode_snapshot_line, decode_stream_line, SnapshotChange, StreamEvent};
pub use merge::{merge_fragment, MergeError};
pub use review::{skip_fragment, NotifyScope, ReviewInput, REVIEW_TAG, SANITY_LABEL};
pub use rules::{ExclusionList, ExclusionRule};
