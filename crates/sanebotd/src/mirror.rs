//! Per-project bare mirrors and selective patch-set fetches.
//!
//! Mirrors are created lazily under a configured base directory and
//! persist across runs. The mainline fetch specs of each project are read
//! once per run from the mirror's remote configuration and combined into
//! the same fetch as the patch-set ref, so branch heads stay current
//! without a separate full fetch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use sanebot_core::ReviewTask;
use sanebot_workers::CommandHost;

/// Mirror failures, split by blast radius: a broken mirror setup ends the
/// run, a failed fetch only skips the change at hand.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror initialization failed for {project}: {detail}")]
    Init { project: String, detail: String },

    #[error("fetch of {ref_name} failed for {project}: {detail}")]
    Fetch {
        project: String,
        ref_name: String,
        detail: String,
    },
}

pub struct GitMirrorCache {
    base: PathBuf,
    remote_base: String,
    host: Arc<dyn CommandHost>,
    mainline: HashMap<String, Vec<String>>,
}

impl GitMirrorCache {
    pub fn new(base: PathBuf, remote_base: String, host: Arc<dyn CommandHost>) -> Self {
        Self {
            base,
            remote_base,
            host,
            mainline: HashMap::new(),
        }
    }

    /// Drop the cached mainline specs for a project. Called when an
    /// upstream ref-update makes them stale; the next fetch re-reads them.
    pub fn invalidate(&mut self, project: &str) {
        if self.mainline.remove(project).is_some() {
            debug!(project, "mainline fetch specs invalidated");
        }
    }

    /// Fetch the task's patch-set ref into the project mirror, updating
    /// the mainline heads in the same operation. The local ref name is
    /// deterministic per change number so workers can find the revision.
    pub async fn fetch_change(&mut self, task: &ReviewTask) -> Result<(), MirrorError> {
        let project = &task.change.project;
        let dir = self.ensure(project).await?;
        let specs = self.mainline_specs(project, &dir).await?;

        let mut argv: Vec<String> = ["git", "fetch", "--quiet", "origin"]
            .map(String::from)
            .to_vec();
        argv.extend(specs);
        argv.push(format!(
            "+{}:refs/changes/{}",
            task.patch_set.ref_name, task.change.number
        ));

        let output = self
            .host
            .run(&argv, Some(&dir))
            .await
            .map_err(|e| MirrorError::Fetch {
                project: project.clone(),
                ref_name: task.patch_set.ref_name.clone(),
                detail: e.to_string(),
            })?;
        if !output.success() {
            return Err(MirrorError::Fetch {
                project: project.clone(),
                ref_name: task.patch_set.ref_name.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(project = %project, ref_name = %task.patch_set.ref_name, "patch set fetched");
        Ok(())
    }

    /// Ensure the project mirror exists, initializing it on first use.
    async fn ensure(&self, project: &str) -> Result<PathBuf, MirrorError> {
        let dir = self.base.join(format!("{project}.git"));
        if dir.join("HEAD").exists() {
            return Ok(dir);
        }

        info!(project, dir = %dir.display(), "initializing mirror");
        std::fs::create_dir_all(&dir).map_err(|e| MirrorError::Init {
            project: project.to_string(),
            detail: e.to_string(),
        })?;

        let url = format!("{}/{}", self.remote_base, project);
        self.git(project, &dir, &["init", "--quiet", "--bare"]).await?;
        self.git(project, &dir, &["remote", "add", "origin", &url]).await?;
        // Mirror heads to heads; the per-change refs come in selectively.
        self.git(
            project,
            &dir,
            &[
                "config",
                "--replace-all",
                "remote.origin.fetch",
                "+refs/heads/*:refs/heads/*",
            ],
        )
        .await?;
        Ok(dir)
    }

    /// Mainline fetch specs for a project, read once per run from the
    /// mirror's remote configuration.
    async fn mainline_specs(&mut self, project: &str, dir: &Path) -> Result<Vec<String>, MirrorError> {
        if let Some(specs) = self.mainline.get(project) {
            return Ok(specs.clone());
        }
        let output = self
            .run_git(dir, &["config", "--get-all", "remote.origin.fetch"])
            .await
            .map_err(|detail| MirrorError::Init {
                project: project.to_string(),
                detail,
            })?;
        let specs: Vec<String> = String::from_utf8_lossy(&output)
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.mainline.insert(project.to_string(), specs.clone());
        Ok(specs)
    }

    async fn git(&self, project: &str, dir: &Path, args: &[&str]) -> Result<(), MirrorError> {
        self.run_git(dir, args)
            .await
            .map(|_| ())
            .map_err(|detail| MirrorError::Init {
                project: project.to_string(),
                detail,
            })
    }

    async fn run_git(&self, dir: &Path, args: &[&str]) -> Result<Vec<u8>, String> {
        let mut argv = vec!["git".to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        let output = self
            .host
            .run(&argv, Some(dir))
            .await
            .map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanebot_core::{Change, PatchSet};
    use sanebot_workers::SystemHost;
    use std::process::Command as StdCommand;

    fn run_git(dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// Upstream repo with one commit on master and that commit reachable
    /// as a change ref.
    fn make_upstream(root: &Path) -> PathBuf {
        let dir = root.join("demo");
        std::fs::create_dir_all(&dir).unwrap();
        run_git(&dir, &["init", "-q", "-b", "master"]);
        run_git(&dir, &["config", "user.name", "test-user"]);
        run_git(&dir, &["config", "user.email", "test@example.com"]);
        run_git(&dir, &["commit", "--allow-empty", "-m", "initial"]);
        run_git(&dir, &["update-ref", "refs/changes/07/7/1", "HEAD"]);
        dir
    }

    fn task() -> ReviewTask {
        ReviewTask {
            change: Change {
                number: 7,
                project: "demo".to_string(),
                branch: "master".to_string(),
            },
            patch_set: PatchSet {
                ref_name: "refs/changes/07/7/1".to_string(),
                revision: "unused".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_fetch_change_initializes_and_fetches() {
        let root = tempfile::tempdir().unwrap();
        make_upstream(root.path());

        let base = root.path().join("mirrors");
        let mut cache = GitMirrorCache::new(
            base.clone(),
            root.path().to_string_lossy().to_string(),
            Arc::new(SystemHost),
        );

        cache.fetch_change(&task()).await.unwrap();

        let mirror = base.join("demo.git");
        assert!(mirror.join("HEAD").exists());
        // The change landed under its deterministic local name, and the
        // mainline head came along in the same fetch.
        run_git(&mirror, &["rev-parse", "--verify", "refs/changes/7"]);
        run_git(&mirror, &["rev-parse", "--verify", "refs/heads/master"]);
    }

    #[tokio::test]
    async fn test_mainline_specs_cached_until_invalidated() {
        let root = tempfile::tempdir().unwrap();
        make_upstream(root.path());

        let mut cache = GitMirrorCache::new(
            root.path().join("mirrors"),
            root.path().to_string_lossy().to_string(),
            Arc::new(SystemHost),
        );

        cache.fetch_change(&task()).await.unwrap();
        assert!(cache.mainline.contains_key("demo"));

        cache.invalidate("demo");
        assert!(!cache.mainline.contains_key("demo"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_init_failure() {
        let root = tempfile::tempdir().unwrap();
        // No upstream repo: init succeeds, the fetch itself fails.
        let mut cache = GitMirrorCache::new(
            root.path().join("mirrors"),
            root.path().join("missing").to_string_lossy().to_string(),
            Arc::new(SystemHost),
        );

        let err = cache.fetch_change(&task()).await.unwrap_err();
        assert!(matches!(err, MirrorError::Fetch { .. }));
    }
}
