//! Subprocess execution for the site build and the CLI-backed audit tools.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::context::ExecContext;
use crate::error::{AuditError, Result};

/// A command line plus the directory and environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments after the executable.
    pub args: Vec<String>,

    /// Working directory (inherits the parent's when `None`).
    pub cwd: Option<PathBuf>,

    /// Variables layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Create a spec with no working directory or extra environment.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Split a shell-style command string, e.g. `bundle exec jekyll build`.
    pub fn parse(command: &str) -> Result<Self> {
        let mut words =
            shell_words::split(command).map_err(|e| AuditError::InvalidBuildCommand {
                command: command.to_string(),
                reason: e.to_string(),
            })?;
        if words.is_empty() {
            return Err(AuditError::InvalidBuildCommand {
                command: command.to_string(),
                reason: "command is empty".to_string(),
            });
        }
        let program = words.remove(0);
        Ok(Self::new(program, words))
    }

    /// Run inside the context directory with the context environment.
    pub fn in_context(mut self, ctx: &ExecContext) -> Self {
        self.cwd = Some(ctx.cwd.clone());
        self.env.extend(ctx.env.clone());
        self
    }

    /// Override the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command line joined back together, for logs and errors.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Runs a command to completion with inherited stdio.
///
/// The build step goes through this trait so a run can be exercised
/// without spawning a real site generator.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and return its exit code (`None` if killed by a signal).
    async fn status(&self, spec: &CommandSpec) -> std::io::Result<Option<i32>>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn status(&self, spec: &CommandSpec) -> std::io::Result<Option<i32>> {
        let status = spec.command().status().await?;
        Ok(status.code())
    }
}

/// Captured output of a finished tool process.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CapturedOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to the exit code.
    pub fn failure_message(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exited with code {}", self.exit_code))
    }
}

/// Run a tool and capture its output.
///
/// A `timeout_secs` of 0 disables the timeout. On timeout the child is
/// killed.
pub async fn capture(tool: &str, spec: &CommandSpec, timeout_secs: u64) -> Result<CapturedOutput> {
    let start = Instant::now();
    debug!(tool = tool, command = %spec.display(), "Spawning tool");

    let child = spec
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| AuditError::ToolSpawn {
            tool: tool.to_string(),
            source,
        })?;

    let output = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| AuditError::ToolTimeout {
                tool: tool.to_string(),
                secs: timeout_secs,
            })??
    } else {
        child.wait_with_output().await?
    };

    Ok(CapturedOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_words() {
        let spec = CommandSpec::parse("bundle exec jekyll build").expect("parse");
        assert_eq!(spec.program, "bundle");
        assert_eq!(spec.args, vec!["exec", "jekyll", "build"]);
    }

    #[test]
    fn test_parse_honours_quotes() {
        let spec = CommandSpec::parse("sh -c 'echo built'").expect("parse");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args, vec!["-c", "echo built"]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = CommandSpec::parse("   ").unwrap_err();
        assert!(matches!(err, AuditError::InvalidBuildCommand { .. }));
    }

    #[test]
    fn test_in_context_sets_cwd_and_env() {
        let ctx = ExecContext::new("/srv/site").with_var("LANG", "C");
        let spec = CommandSpec::new("make", vec![])
            .in_context(&ctx)
            .env("JEKYLL_ENV", "production");
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv/site")));
        assert_eq!(spec.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(spec.env.get("JEKYLL_ENV").map(String::as_str), Some("production"));
    }

    #[test]
    fn test_failure_message_uses_last_stderr_line() {
        let out = CapturedOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "warming up\nRuntime error: no chrome\n\n".to_string(),
            duration_ms: 5,
        };
        assert_eq!(out.failure_message(), "Runtime error: no chrome");

        let silent = CapturedOutput {
            stderr: String::new(),
            ..out
        };
        assert_eq!(silent.failure_message(), "exited with code 1");
    }

    #[tokio::test]
    async fn test_capture_simple_command() {
        let spec = CommandSpec::new("echo", vec!["hello".to_string()]);
        let out = capture("echo", &spec, 60).await.expect("capture failed");
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_capture_failing_command() {
        let spec = CommandSpec::new("false", vec![]);
        let out = capture("false", &spec, 60).await.expect("capture failed");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_capture_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-tool-xyz", vec![]);
        let err = capture("ghost", &spec, 5).await.unwrap_err();
        assert!(matches!(err, AuditError::ToolSpawn { .. }));
    }

    #[tokio::test]
    async fn test_runner_reports_exit_code() {
        let runner = TokioCommandRunner;
        let ok = runner
            .status(&CommandSpec::new("true", vec![]))
            .await
            .expect("spawn true");
        assert_eq!(ok, Some(0));

        let failed = runner
            .status(&CommandSpec::new("false", vec![]))
            .await
            .expect("spawn false");
        assert_ne!(failed, Some(0));
    }
}
