//! Verdict assembly: from merged worker fragments to the review submitted
//! back to the server.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::merge::{merge_fragment, shape_name, MergeError};

/// Tag attached to every review this bot posts, so humans and tooling can
/// recognize machine-generated verdicts idempotently.
pub const REVIEW_TAG: &str = "autogenerated:sanity-review";

/// The label this bot votes on.
pub const SANITY_LABEL: &str = "Sanity-Review";

/// Outbound notification scope for a posted review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotifyScope {
    All,
    None,
}

/// The merged review posted back for one patch set. Built fresh per change,
/// discarded after submission.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Label votes. Values stay untyped: the merge can legitimately
    /// produce a joined text where two workers voted the same label.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub labels: Map<String, Value>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub comments: Map<String, Value>,

    pub tag: String,

    pub notify: NotifyScope,
}

impl ReviewInput {
    /// Merge the ordered worker fragments into a single review, attach the
    /// fixed tag, and decide the notification scope.
    pub fn from_fragments(fragments: Vec<Value>) -> Result<Self, MergeError> {
        let mut merged = Map::new();
        for fragment in fragments {
            merge_fragment(&mut merged, fragment)?;
        }
        Self::from_merged(merged)
    }

    fn from_merged(mut merged: Map<String, Value>) -> Result<Self, MergeError> {
        let message = merged.remove("message").map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        let labels = take_mapping(&mut merged, "labels")?;
        let comments = take_mapping(&mut merged, "comments")?;

        let mut review = ReviewInput {
            message,
            labels,
            comments,
            tag: REVIEW_TAG.to_string(),
            notify: NotifyScope::All,
        };
        if review.is_routine() {
            review.notify = NotifyScope::None;
        }
        Ok(review)
    }

    /// A lone non-negative sanity vote with no comments is an uneventful
    /// pass; nobody gets notified for it.
    fn is_routine(&self) -> bool {
        if !self.comments.is_empty() || self.labels.len() != 1 {
            return false;
        }
        match self.labels.get(SANITY_LABEL) {
            Some(Value::Number(n)) => n.as_i64().map_or(true, |v| v >= 0),
            // Joined-text votes only arise from workers that all voted;
            // treated as non-negative.
            Some(_) => true,
            None => false,
        }
    }
}

/// The synthesized fragment for an excluded project/branch pair.
pub fn skip_fragment() -> Value {
    json!({
        "message": "(skipped)",
        "labels": { SANITY_LABEL: 1 },
    })
}

fn take_mapping(
    merged: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Map<String, Value>, MergeError> {
    match merged.remove(key) {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(MergeError::FieldShape {
            key,
            expected: "mapping",
            got: shape_name(&other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uneventful_pass_suppresses_notifications() {
        let review =
            ReviewInput::from_fragments(vec![json!({"labels": {"Sanity-Review": 1}})]).unwrap();
        assert_eq!(review.notify, NotifyScope::None);
    }

    #[test]
    fn test_any_comment_restores_notifications() {
        let review = ReviewInput::from_fragments(vec![json!({
            "labels": {"Sanity-Review": 1},
            "comments": {"src/a.c": [{"line": 3, "message": "tab damage"}]},
        })])
        .unwrap();
        assert_eq!(review.notify, NotifyScope::All);
    }

    #[test]
    fn test_negative_vote_notifies() {
        let review =
            ReviewInput::from_fragments(vec![json!({"labels": {"Sanity-Review": -2}})]).unwrap();
        assert_eq!(review.notify, NotifyScope::All);
    }

    #[test]
    fn test_second_label_notifies() {
        let review = ReviewInput::from_fragments(vec![
            json!({"labels": {"Sanity-Review": 1}}),
            json!({"labels": {"Code-Review": -1}}),
        ])
        .unwrap();
        assert_eq!(review.notify, NotifyScope::All);
    }

    #[test]
    fn test_joined_votes_still_suppress() {
        // The identical-vote merge quirk must not page anyone either.
        let review = ReviewInput::from_fragments(vec![
            json!({"labels": {"Sanity-Review": 1}}),
            json!({"labels": {"Sanity-Review": 1}}),
        ])
        .unwrap();
        assert_eq!(review.labels[SANITY_LABEL], "1\n\n1");
        assert_eq!(review.notify, NotifyScope::None);
    }

    #[test]
    fn test_tag_always_attached() {
        let review = ReviewInput::from_fragments(vec![]).unwrap();
        assert_eq!(review.tag, REVIEW_TAG);
    }

    #[test]
    fn test_skip_fragment_assembles_to_quiet_verdict() {
        let review = ReviewInput::from_fragments(vec![skip_fragment()]).unwrap();
        assert_eq!(review.message.as_deref(), Some("(skipped)"));
        assert_eq!(review.labels[SANITY_LABEL], 1);
        assert_eq!(review.notify, NotifyScope::None);
    }

    #[test]
    fn test_labels_field_must_be_a_mapping() {
        let err = ReviewInput::from_fragments(vec![json!({"labels": 5})]).unwrap_err();
        assert_eq!(
            err,
            MergeError::FieldShape {
                key: "labels",
                expected: "mapping",
                got: "scalar",
            }
        );
    }

    #[test]
    fn test_serialized_shape() {
        let review = ReviewInput::from_fragments(vec![json!({
            "message": "ok",
            "labels": {"Sanity-Review": 1},
        })])
        .unwrap();
        let wire = serde_json::to_value(&review).unwrap();
        assert_eq!(wire["message"], "ok");
        assert_eq!(wire["labels"]["Sanity-Review"], 1);
        assert_eq!(wire["tag"], REVIEW_TAG);
        assert_eq!(wire["notify"], "NONE");
        assert!(wire.get("comments").is_none());
    }
}
