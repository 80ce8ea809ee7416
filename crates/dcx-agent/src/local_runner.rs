//! Shell execution for `run_bash`, outside the sandbox service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::security_middleware::SecurityMiddleware;

const SAFE_COMMAND_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "USER", "SHELL", "LANG", "LC_ALL", "LC_CTYPE", "TERM", "TMPDIR", "TMP", "TEMP",
    "TZ",
];

pub const DEFAULT_MAX_STREAM_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
/// Public struct `CommandRunnerConfig` used across dcx components.
pub struct CommandRunnerConfig {
    pub working_dir: PathBuf,
    pub timeout_ms: u64,
    pub max_stream_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Captured result of a finished command.
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn render(&self) -> String {
        let status = self
            .status
            .map(|code| code.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());
        format!(
            "STDOUT:\n{}\nSTDERR:\n{}\nexit status: {status}",
            self.stdout, self.stderr
        )
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `CommandError` values.
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("blocked dangerous pattern: {pattern}")]
    Blocked { pattern: String },
    #[error("command timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
/// Runs `sh -c` with a cleared environment and a hard timeout.
pub struct CommandRunner {
    config: CommandRunnerConfig,
    security: SecurityMiddleware,
}

impl CommandRunner {
    pub fn new(config: CommandRunnerConfig, security: SecurityMiddleware) -> Self {
        Self { config, security }
    }

    pub fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }

    pub async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        self.run_in(command, &self.config.working_dir).await
    }

    pub async fn run_in(&self, command: &str, cwd: &Path) -> Result<CommandOutput, CommandError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(CommandError::Empty);
        }
        if let Some(pattern) = self.security.find_unsafe_pattern(command) {
            tracing::warn!(%command, pattern, "refusing to spawn dangerous command");
            return Err(CommandError::Blocked {
                pattern: pattern.to_string(),
            });
        }

        let mut builder = Command::new("sh");
        builder.arg("-c").arg(command);
        builder.kill_on_drop(true);
        builder.env_clear();
        for key in SAFE_COMMAND_ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                builder.env(key, value);
            }
        }
        builder.current_dir(cwd);

        let timeout_ms = self.config.timeout_ms.max(1);
        let output = match timeout(Duration::from_millis(timeout_ms), builder.output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(%command, timeout_ms, "command timed out");
                return Err(CommandError::Timeout { timeout_ms });
            }
        };

        let limit = self.config.max_stream_bytes;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: truncate_bytes(&String::from_utf8_lossy(&output.stdout), limit),
            stderr: truncate_bytes(&String::from_utf8_lossy(&output.stderr), limit),
        })
    }
}

fn truncate_bytes(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    let mut end = limit;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut output = value[..end].to_string();
    output.push_str("\n<output truncated>");
    output
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{truncate_bytes, CommandError, CommandRunner, CommandRunnerConfig};
    use crate::SecurityMiddleware;

    fn runner(dir: &std::path::Path, timeout_ms: u64) -> CommandRunner {
        CommandRunner::new(
            CommandRunnerConfig {
                working_dir: dir.to_path_buf(),
                timeout_ms,
                max_stream_bytes: 1_024,
            },
            SecurityMiddleware::new().expect("security"),
        )
    }

    #[tokio::test]
    async fn functional_stdout_and_stderr_are_captured_separately() {
        let temp = tempdir().expect("tempdir");
        let output = runner(temp.path(), 5_000)
            .run("echo out; echo err 1>&2; exit 3")
            .await
            .expect("run");
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.status, Some(3));
        assert!(!output.success());
        assert!(output.render().starts_with("STDOUT:\nout\n\nSTDERR:\nerr\n"));
    }

    #[tokio::test]
    async fn functional_commands_run_in_working_dir() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("marker");
        let output = runner(temp.path(), 5_000)
            .run("cat marker.txt")
            .await
            .expect("run");
        assert_eq!(output.stdout, "here");
    }

    #[tokio::test]
    async fn regression_timeout_kills_long_commands() {
        let temp = tempdir().expect("tempdir");
        let error = runner(temp.path(), 100)
            .run("sleep 5")
            .await
            .expect_err("timeout");
        assert!(matches!(error, CommandError::Timeout { timeout_ms: 100 }));
        assert_eq!(error.to_string(), "command timed out after 100 ms");
    }

    #[tokio::test]
    async fn regression_dangerous_commands_are_never_spawned() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("keep.txt"), "x").expect("keep");
        let error = runner(temp.path(), 5_000)
            .run("rm -rf keep.txt")
            .await
            .expect_err("blocked");
        assert_eq!(error.to_string(), r"blocked dangerous pattern: rm\s+-rf");
        assert!(temp.path().join("keep.txt").exists());
    }

    #[test]
    fn unit_truncate_bytes_respects_char_boundaries() {
        assert_eq!(truncate_bytes("short", 10), "short");
        assert_eq!(truncate_bytes("ééé", 3), "é\n<output truncated>");
    }
}
