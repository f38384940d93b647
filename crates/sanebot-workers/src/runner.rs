//! Worker execution and output validation.

use sanebot_core::ReviewTask;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, WorkerError};
use crate::host::CommandHost;
use crate::spec::WorkerSpec;

/// Hard cap on a single worker's captured output. Anything larger is not
/// parsed; the worker is reported to the maintainers instead.
pub const MAX_WORKER_OUTPUT: usize = 50_000;

/// Outcome of one worker invocation.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// Parsed verdict fragment, with the invite list already extracted.
    Fragment {
        fragment: Value,
        invites: Vec<String>,
    },

    /// Output exceeded [`MAX_WORKER_OUTPUT`]; parsing was skipped for this
    /// worker only.
    Oversized { bytes: usize },
}

/// Run one worker against a patch set and validate its output.
///
/// The worker must exit 0 and emit exactly one JSON object on stdout; any
/// leading lines that do not start with `{` are treated as diagnostics and
/// forwarded to the log.
pub async fn run_worker(
    host: &dyn CommandHost,
    spec: &WorkerSpec,
    task: &ReviewTask,
) -> Result<WorkerOutcome> {
    let argv = spec.resolve(task);
    debug!(worker = %spec.name, command = ?argv, "running worker");

    let output = host
        .run(&argv, None)
        .await
        .map_err(|source| WorkerError::Spawn {
            name: spec.name.clone(),
            source,
        })?;

    match output.code {
        None => {
            return Err(WorkerError::Signalled {
                name: spec.name.clone(),
            })
        }
        Some(0) => {}
        Some(code) => {
            return Err(WorkerError::Exited {
                name: spec.name.clone(),
                code,
            })
        }
    }

    // Single combined buffer; stderr is placed ahead of stdout so worker
    // chatter falls into the strippable diagnostic prefix and the
    // structured document stays at the tail.
    let mut combined = output.stderr;
    combined.extend_from_slice(&output.stdout);

    if combined.len() > MAX_WORKER_OUTPUT {
        warn!(
            worker = %spec.name,
            bytes = combined.len(),
            "worker output exceeds cap, skipping parse"
        );
        return Ok(WorkerOutcome::Oversized {
            bytes: combined.len(),
        });
    }

    let text = String::from_utf8_lossy(&combined);
    let payload = strip_diagnostics(&spec.name, &text);

    let mut fragment: Value =
        serde_json::from_str(payload).map_err(|e| WorkerError::Output {
            name: spec.name.clone(),
            detail: e.to_string(),
        })?;
    if !fragment.is_object() {
        return Err(WorkerError::Output {
            name: spec.name.clone(),
            detail: "expected a single JSON object".to_string(),
        });
    }

    let invites = take_invites(&spec.name, &mut fragment)?;
    Ok(WorkerOutcome::Fragment { fragment, invites })
}

/// Warning fragment for a worker that blew the output cap. Merged into the
/// verdict in place of the worker's own (unparsed) result.
pub fn oversized_fragment(worker: &str, bytes: usize) -> Value {
    json!({
        "message": format!(
            "Worker {worker} produced {bytes} bytes of output, which is not \
             reasonable. The maintainers have been asked to have a look.",
        ),
    })
}

/// Strip leading non-payload lines, forwarding each to the log.
fn strip_diagnostics<'a>(worker: &str, text: &'a str) -> &'a str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with('{') {
            break;
        }
        let diag = line.trim_end_matches(['\r', '\n']);
        if !diag.is_empty() {
            info!(worker, "{diag}");
        }
        offset += line.len();
    }
    &text[offset..]
}

/// Remove the optional invite list from a parsed fragment.
fn take_invites(worker: &str, fragment: &mut Value) -> Result<Vec<String>> {
    let Some(map) = fragment.as_object_mut() else {
        return Ok(Vec::new());
    };
    match map.remove("invite") {
        None => Ok(Vec::new()),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(identity) => Ok(identity),
                _ => Err(WorkerError::InviteShape {
                    name: worker.to_string(),
                }),
            })
            .collect(),
        Some(_) => Err(WorkerError::InviteShape {
            name: worker.to_string(),
        }),
    }
}
