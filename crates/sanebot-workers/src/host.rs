//! Subprocess capability.
//!
//! Every external process the agent drives (verification workers, git
//! mirror operations, the privileged invite transport) goes through
//! `CommandHost`, so all of them are substitutable in tests.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct HostOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,

    /// Captured stdout.
    pub stdout: Vec<u8>,

    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl HostOutput {
    /// Whether the process exited cleanly with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability to run one command to completion and capture its output.
#[async_trait]
pub trait CommandHost: Send + Sync {
    /// Run `argv` (first element is the executable), optionally in `cwd`,
    /// and wait for it to exit.
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> io::Result<HostOutput>;
}

/// Production host backed by real subprocesses.
pub struct SystemHost;

#[async_trait]
impl CommandHost for SystemHost {
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> io::Result<HostOutput> {
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut cmd = Command::new(exe);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        Ok(HostOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
