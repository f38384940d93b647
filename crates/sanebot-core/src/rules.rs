//! Exclusion rules over (project, branch) pairs.
//!
//! Matched before any mirror or worker interaction; an excluded change gets
//! the fixed skip verdict instead of a real review.

/// A single exclusion pattern. Three forms are accepted:
///
/// - `project`: every branch of the project
/// - `*:branch`: the branch in every project
/// - `project:branch`: one exact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionRule {
    Project(String),
    Branch(String),
    Pair { project: String, branch: String },
}

impl ExclusionRule {
    /// Parse one rule from its configuration form.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            None => ExclusionRule::Project(raw.to_string()),
            Some(("*", branch)) => ExclusionRule::Branch(branch.to_string()),
            Some((project, branch)) => ExclusionRule::Pair {
                project: project.to_string(),
                branch: branch.to_string(),
            },
        }
    }

    /// Whether this rule excludes the given pair.
    pub fn matches(&self, project: &str, branch: &str) -> bool {
        match self {
            ExclusionRule::Project(p) => p == project,
            ExclusionRule::Branch(b) => b == branch,
            ExclusionRule::Pair {
                project: p,
                branch: b,
            } => p == project && b == branch,
        }
    }
}

/// The configured set of exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    rules: Vec<ExclusionRule>,
}

impl ExclusionList {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            rules: raw.iter().map(|r| ExclusionRule::parse(r.as_ref())).collect(),
        }
    }

    pub fn excludes(&self, project: &str, branch: &str) -> bool {
        self.rules.iter().any(|r| r.matches(project, branch))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_rule_matches_every_branch() {
        let rule = ExclusionRule::parse("playground");
        assert!(rule.matches("playground", "master"));
        assert!(rule.matches("playground", "dev"));
        assert!(!rule.matches("platform", "master"));
    }

    #[test]
    fn test_branch_wildcard_matches_every_project() {
        let rule = ExclusionRule::parse("*:release");
        assert!(rule.matches("platform", "release"));
        assert!(rule.matches("playground", "release"));
        assert!(!rule.matches("platform", "master"));
    }

    #[test]
    fn test_pair_rule_is_exact() {
        let rule = ExclusionRule::parse("platform:old-stable");
        assert!(rule.matches("platform", "old-stable"));
        assert!(!rule.matches("platform", "stable"));
        assert!(!rule.matches("playground", "old-stable"));
    }

    #[test]
    fn test_list_any_rule_wins() {
        let list = ExclusionList::parse(&["playground", "*:release"]);
        assert!(list.excludes("playground", "dev"));
        assert!(list.excludes("anything", "release"));
        assert!(!list.excludes("platform", "master"));
    }

    #[test]
    fn test_empty_list_excludes_nothing() {
        let list = ExclusionList::default();
        assert!(list.is_empty());
        assert!(!list.excludes("platform", "master"));
    }
}
