//! Decoding of the review server's line-oriented JSON feeds.
//!
//! Both the live event stream and the one-shot open-changes query emit one
//! JSON object per line. Recognized live event kinds are
//! `patchset-created`, `ref-updated` and `comment-added`; unrecognized
//! kinds are ignored. A line that is not valid JSON is a protocol
//! violation and aborts the run.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::change::{normalize_project, Change, PatchSet, ReviewTask};
use crate::error::{BotError, Result};

/// Wire form of a change embedded in a live event or snapshot row.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeWire {
    pub project: String,
    pub branch: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub number: u64,
}

impl ChangeWire {
    fn into_change(self) -> Change {
        Change {
            number: self.number,
            project: normalize_project(&self.project),
            branch: self.branch,
        }
    }
}

/// Wire form of a patch set.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchSetWire {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub revision: String,
    #[serde(default)]
    pub approvals: Vec<ApprovalWire>,
}

impl PatchSetWire {
    fn into_patch_set(self) -> PatchSet {
        PatchSet {
            ref_name: self.ref_name,
            revision: self.revision,
        }
    }
}

/// A recorded approval on a patch set.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalWire {
    #[serde(default)]
    pub by: Option<AccountWire>,
}

/// An account reference on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountWire {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdateWire {
    project: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentWire {
    change: ChangeWire,
    #[serde(rename = "patchSet")]
    patch_set: PatchSetWire,
    #[serde(default)]
    comment: String,
}

/// A decoded live stream event.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A new patch set was uploaded; candidate for review.
    PatchSetCreated { task: ReviewTask },

    /// An upstream ref moved; cached mainline fetch specs for the project
    /// are stale.
    RefUpdated { project: String },

    /// Somebody commented on a change.
    CommentAdded { task: ReviewTask, comment: String },
}

/// Decode one line of the live event stream.
///
/// Returns `Ok(None)` for valid JSON of an unrecognized kind.
pub fn decode_stream_line(line: &str) -> Result<Option<StreamEvent>> {
    let value: Value = serde_json::from_str(line).map_err(|e| BotError::MalformedPayload {
        origin: "event stream",
        detail: e.to_string(),
    })?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match kind.as_str() {
        "patchset-created" => {
            let change: ChangeWire = sub_field(&value, "change")?;
            let patch_set: PatchSetWire = sub_field(&value, "patchSet")?;
            Ok(Some(StreamEvent::PatchSetCreated {
                task: ReviewTask {
                    change: change.into_change(),
                    patch_set: patch_set.into_patch_set(),
                },
            }))
        }
        "ref-updated" => {
            let update: RefUpdateWire = sub_field(&value, "refUpdate")?;
            Ok(Some(StreamEvent::RefUpdated {
                project: normalize_project(&update.project),
            }))
        }
        "comment-added" => {
            let wire: CommentWire =
                serde_json::from_value(value).map_err(|e| BotError::MalformedPayload {
                    origin: "event stream",
                    detail: e.to_string(),
                })?;
            Ok(Some(StreamEvent::CommentAdded {
                task: ReviewTask {
                    change: wire.change.into_change(),
                    patch_set: wire.patch_set.into_patch_set(),
                },
                comment: wire.comment,
            }))
        }
        _ => Ok(None),
    }
}

/// One open change from the startup snapshot query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChange {
    pub project: String,
    pub branch: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub number: u64,
    #[serde(default)]
    pub current_patch_set: Option<PatchSetWire>,
}

impl SnapshotChange {
    /// Whether the given identity already voted on the current patch set.
    pub fn approved_by(&self, email: &str) -> bool {
        self.current_patch_set
            .as_ref()
            .map(|ps| {
                ps.approvals
                    .iter()
                    .filter_map(|a| a.by.as_ref())
                    .filter_map(|by| by.email.as_deref())
                    .any(|e| e == email)
            })
            .unwrap_or(false)
    }

    /// Convert into a review task. `None` when the row carries no current
    /// patch set (nothing to fetch or review).
    pub fn into_task(self) -> Option<ReviewTask> {
        let patch_set = self.current_patch_set?;
        Some(ReviewTask {
            change: Change {
                number: self.number,
                project: normalize_project(&self.project),
                branch: self.branch,
            },
            patch_set: patch_set.into_patch_set(),
        })
    }
}

/// Decode one line of the snapshot query output.
///
/// The query terminates with a stats row (`"type": "stats"`); that row, and
/// any other typed row, decodes to `Ok(None)`.
pub fn decode_snapshot_line(line: &str) -> Result<Option<SnapshotChange>> {
    let value: Value = serde_json::from_str(line).map_err(|e| BotError::MalformedPayload {
        origin: "snapshot query",
        detail: e.to_string(),
    })?;

    if value.get("type").is_some() {
        return Ok(None);
    }

    let change: SnapshotChange =
        serde_json::from_value(value).map_err(|e| BotError::MalformedPayload {
            origin: "snapshot query",
            detail: e.to_string(),
        })?;
    Ok(Some(change))
}

fn sub_field<T: de::DeserializeOwned>(value: &Value, key: &'static str) -> Result<T> {
    let field = value.get(key).ok_or_else(|| BotError::MalformedPayload {
        origin: "event stream",
        detail: format!("missing field {key}"),
    })?;
    serde_json::from_value(field.clone()).map_err(|e| BotError::MalformedPayload {
        origin: "event stream",
        detail: format!("{key}: {e}"),
    })
}

/// Change numbers arrive as JSON numbers from some server versions and as
/// strings from others.
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientU64;

    impl de::Visitor<'_> for LenientU64 {
        type Value = u64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an unsigned integer or a numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("negative change number"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            v.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(LenientU64)
}
