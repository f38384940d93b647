//! Typed configuration materialized from opaque key/value lookups.
//!
//! Configuration loading and credential resolution live outside the agent:
//! whatever spawned us supplies values through a flat lookup (environment,
//! a key=value file, anything). Missing mandatory keys are fatal at
//! startup, before any connection is opened.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sanebot_core::{BotError, ExclusionList};
use sanebot_workers::WorkerSet;

/// Everything the agent needs to run, resolved and validated.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Review server host for the command transport.
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,

    /// Base URL of the structured review endpoint.
    pub rest_url: String,
    pub rest_user: String,
    pub rest_password: String,

    /// The bot's own identity; used to skip changes it already voted on.
    pub bot_email: String,

    /// Base directory for the per-project bare mirrors.
    pub mirror_dir: PathBuf,

    /// Whether to maintain mirrors and fetch patch sets at all.
    pub fetch: bool,

    /// Verification workers, in invocation (and merge) order.
    pub workers: WorkerSet,

    pub excluded: ExclusionList,

    /// Escalation targets for misbehaving workers.
    pub maintainers: Vec<String>,

    pub verbose: bool,

    /// Only add reviewers; never post verdicts.
    pub invite_only: bool,
}

impl AgentConfig {
    /// Materialize the configuration from an opaque lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let ssh_host = required(&lookup, "host")?;
        let ssh_port = match lookup("port") {
            None => 29418,
            Some(raw) => raw.parse().map_err(|_| BotError::InvalidConfig {
                key: "port".to_string(),
                value: raw.clone(),
                detail: "not a port number".to_string(),
            })?,
        };
        let ssh_user = required(&lookup, "user")?;

        let rest_url = required(&lookup, "rest_url")?;
        let rest_user = lookup("rest_user").unwrap_or_else(|| ssh_user.clone());
        let rest_password = required(&lookup, "rest_password")?;

        let bot_email = required(&lookup, "bot_email")?;

        let fetch = flag(&lookup, "fetch", true)?;
        let mirror_dir = if fetch {
            PathBuf::from(required(&lookup, "mirror_dir")?)
        } else {
            lookup("mirror_dir").map(PathBuf::from).unwrap_or_default()
        };

        let order = list(required(&lookup, "workers")?.as_str());
        let workers = WorkerSet::from_config(&order, |name| lookup(&format!("worker.{name}")))
            .context("resolving worker templates")?;

        let excluded = ExclusionList::parse(&lookup("excluded").map(|raw| list(&raw)).unwrap_or_default());
        let maintainers = lookup("maintainers").map(|raw| list(&raw)).unwrap_or_default();

        let verbose = flag(&lookup, "verbose", false)?;
        let invite_only = flag(&lookup, "invite_only", false)?;

        Ok(Self {
            ssh_host,
            ssh_port,
            ssh_user,
            rest_url,
            rest_user,
            rest_password,
            bot_email,
            mirror_dir,
            fetch,
            workers,
            excluded,
            maintainers,
            verbose,
            invite_only,
        })
    }

    /// `ssh -p <port> <user>@<host>` prefix shared by every command
    /// transport call.
    pub fn ssh_base(&self) -> Vec<String> {
        vec![
            "ssh".to_string(),
            "-p".to_string(),
            self.ssh_port.to_string(),
            format!("{}@{}", self.ssh_user, self.ssh_host),
        ]
    }

    /// Command line for the persistent event stream.
    pub fn stream_argv(&self) -> Vec<String> {
        let mut argv = self.ssh_base();
        argv.extend(["gerrit", "stream-events"].map(String::from));
        argv
    }

    /// Command line for the one-shot open-changes snapshot.
    pub fn query_argv(&self) -> Vec<String> {
        let mut argv = self.ssh_base();
        argv.extend(
            [
                "gerrit",
                "query",
                "--format",
                "JSON",
                "--current-patch-set",
                "status:open",
            ]
            .map(String::from),
        );
        argv
    }

    /// Remote URL prefix the mirrors fetch from.
    pub fn remote_base(&self) -> String {
        format!(
            "ssh://{}@{}:{}",
            self.ssh_user, self.ssh_host, self.ssh_port
        )
    }
}

fn required<L: Fn(&str) -> Option<String>>(lookup: &L, key: &str) -> Result<String, BotError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BotError::MissingConfig(key.to_string()))
}

fn flag<L: Fn(&str) -> Option<String>>(
    lookup: &L,
    key: &str,
    default: bool,
) -> Result<bool, BotError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(BotError::InvalidConfig {
                key: key.to_string(),
                value: raw,
                detail: "not a boolean".to_string(),
            }),
        },
    }
}

/// Split a configured list on commas and whitespace.
fn list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\t'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `key = value` file into a map. Blank lines and `#` comments are
/// skipped. This is the thin end of the bootstrap environment, not part of
/// the agent core.
pub fn load_key_values(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut values = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(values)
}

/// Environment-variable form of a configuration key.
pub fn env_key(key: &str) -> String {
    format!(
        "SANEBOT_{}",
        key.to_ascii_uppercase().replace(['.', '-'], "_")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_values() -> HashMap<String, String> {
        [
            ("host", "review.example.org"),
            ("user", "sanebot"),
            ("rest_url", "https://review.example.org"),
            ("rest_password", "sekrit"),
            ("bot_email", "sanebot@example.org"),
            ("mirror_dir", "/var/lib/sanebot/mirrors"),
            ("workers", "checker"),
            ("worker.checker", "run-checks {project} {revision} {branch}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn from_map(values: &HashMap<String, String>) -> Result<AgentConfig> {
        AgentConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_materializes() {
        let config = from_map(&base_values()).unwrap();
        assert_eq!(config.ssh_port, 29418);
        assert_eq!(config.rest_user, "sanebot");
        assert!(config.fetch);
        assert!(!config.invite_only);
        assert_eq!(config.workers.len(), 1);
    }

    #[test]
    fn test_missing_mandatory_key_is_fatal() {
        let mut values = base_values();
        values.remove("bot_email");
        let err = from_map(&values).unwrap_err();
        assert!(err.to_string().contains("bot_email"));
    }

    #[test]
    fn test_undefined_worker_is_fatal() {
        let mut values = base_values();
        values.insert("workers".to_string(), "checker ghost".to_string());
        let err = from_map(&values).unwrap_err();
        assert!(format!("{err:#}").contains("ghost"));
    }

    #[test]
    fn test_mirror_dir_optional_when_not_fetching() {
        let mut values = base_values();
        values.remove("mirror_dir");
        values.insert("fetch".to_string(), "no".to_string());
        let config = from_map(&values).unwrap();
        assert!(!config.fetch);
    }

    #[test]
    fn test_bad_flag_is_fatal() {
        let mut values = base_values();
        values.insert("fetch".to_string(), "maybe".to_string());
        assert!(from_map(&values).is_err());
    }

    #[test]
    fn test_command_lines() {
        let config = from_map(&base_values()).unwrap();
        assert_eq!(
            config.stream_argv(),
            vec!["ssh", "-p", "29418", "sanebot@review.example.org", "gerrit", "stream-events"]
        );
        assert!(config.query_argv().contains(&"--current-patch-set".to_string()));
        assert_eq!(config.remote_base(), "ssh://sanebot@review.example.org:29418");
    }

    #[test]
    fn test_env_key_form() {
        assert_eq!(env_key("worker.checker"), "SANEBOT_WORKER_CHECKER");
        assert_eq!(env_key("rest_url"), "SANEBOT_REST_URL");
    }

    #[test]
    fn test_key_value_file_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sanebot.conf");
        std::fs::write(&path, "# comment\nhost = review.example.org\n\nport=2222\n").unwrap();
        let values = load_key_values(&path).unwrap();
        assert_eq!(values["host"], "review.example.org");
        assert_eq!(values["port"], "2222");
        assert_eq!(values.len(), 2);
    }
}
