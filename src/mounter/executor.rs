//! Local command execution
//!
//! Mounters never spawn processes directly; they go through an [`Executor`]
//! so the exact command sequence can be observed in tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a program with arguments on the local node
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run to completion. A non-zero exit is not an error at this level.
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

pub type ExecutorRef = Arc<dyn Executor>;

/// Executor backed by real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

#[async_trait]
impl Executor for SystemExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("Executing: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::CommandFailed {
                command: program.to_string(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a command and fail on a non-zero exit
pub async fn run_checked(
    executor: &dyn Executor,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput> {
    let output = executor.execute(program, args).await?;
    if !output.success() {
        let reason = match output.stderr.trim() {
            "" => format!("exit status {:?}", output.status),
            stderr => stderr.to_string(),
        };
        return Err(Error::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            reason,
        });
    }
    Ok(output)
}

/// Whether `path` is currently a mountpoint
pub async fn is_mountpoint(executor: &dyn Executor, path: &str) -> Result<bool> {
    let output = executor.execute("mountpoint", &["-q", path]).await?;
    Ok(output.success())
}
