//! Worker command templates and the ordered worker set.

use sanebot_core::ReviewTask;

use crate::error::{Result, WorkerError};

/// A named external command template.
///
/// The template is a whitespace-separated command line whose tokens may
/// contain the placeholders `{project}`, `{revision}` and `{branch}`.
/// Placeholders are resolved per invocation; the template itself is never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub name: String,
    template: Vec<String>,
}

impl WorkerSpec {
    /// Parse a worker definition from its configured command line.
    pub fn new(name: &str, template: &str) -> Result<Self> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return Err(WorkerError::EmptyTemplate {
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            template: tokens,
        })
    }

    /// Resolve the template against one review task.
    pub fn resolve(&self, task: &ReviewTask) -> Vec<String> {
        self.template
            .iter()
            .map(|token| {
                token
                    .replace("{project}", &task.change.project)
                    .replace("{revision}", &task.patch_set.revision)
                    .replace("{branch}", &task.change.branch)
            })
            .collect()
    }
}

/// The configured workers, in invocation order.
///
/// Order is part of the contract: verdict fragments merge in invocation
/// order, so the set preserves the order the configuration listed.
#[derive(Debug, Clone, Default)]
pub struct WorkerSet {
    workers: Vec<WorkerSpec>,
}

impl WorkerSet {
    /// Build the set from the ordered name list, resolving each name's
    /// command template through the configuration lookup. A listed name
    /// without a template is a startup error.
    pub fn from_config<L>(order: &[String], lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut workers = Vec::with_capacity(order.len());
        for name in order {
            let template =
                lookup(name).ok_or_else(|| WorkerError::Undefined(name.clone()))?;
            workers.push(WorkerSpec::new(name, &template)?);
        }
        Ok(Self { workers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerSpec> {
        self.workers.iter()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanebot_core::{Change, PatchSet};

    fn task() -> ReviewTask {
        ReviewTask {
            change: Change {
                number: 4711,
                project: "platform/base".to_string(),
                branch: "stable".to_string(),
            },
            patch_set: PatchSet {
                ref_name: "refs/changes/11/4711/2".to_string(),
                revision: "deadbeef".to_string(),
            },
        }
    }

    #[test]
    fn test_resolve_substitutes_all_placeholders() {
        let spec =
            WorkerSpec::new("checker", "check-tool --project {project} {revision} {branch}")
                .unwrap();
        let argv = spec.resolve(&task());
        assert_eq!(
            argv,
            vec!["check-tool", "--project", "platform/base", "deadbeef", "stable"]
        );
    }

    #[test]
    fn test_resolve_leaves_template_untouched() {
        let spec = WorkerSpec::new("checker", "tool {revision}").unwrap();
        let first = spec.resolve(&task());
        let second = spec.resolve(&task());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_template_rejected() {
        let err = WorkerSpec::new("checker", "   ").unwrap_err();
        assert!(matches!(err, WorkerError::EmptyTemplate { .. }));
    }

    #[test]
    fn test_set_preserves_configured_order() {
        let order = vec!["b".to_string(), "a".to_string()];
        let set = WorkerSet::from_config(&order, |name| Some(format!("run-{name}"))).unwrap();
        let names: Vec<_> = set.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_undefined_worker_is_fatal() {
        let order = vec!["ghost".to_string()];
        let err = WorkerSet::from_config(&order, |_| None).unwrap_err();
        assert!(matches!(err, WorkerError::Undefined(name) if name == "ghost"));
    }
}
