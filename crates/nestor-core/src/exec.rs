//! Shell-command execution
//!
//! Every external tool (git, docker, kubectl) is driven through the
//! [`CommandRunner`] trait so that callers can be exercised against the
//! in-memory [`MockRunner`].

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{CoreError, Result};

/// A command line to execute, with its working directory and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command line without working directory or environment
    pub fn line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Executes shell commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and return its trimmed standard output
    ///
    /// A non-zero exit status is an error carrying the standard error output.
    async fn run(&self, command: &ShellCommand) -> Result<String>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        tracing::debug!(command = %command, cwd = ?command.cwd, "running command");

        let mut process = tokio::process::Command::new(&command.program);
        process.args(&command.args);
        if let Some(cwd) = &command.cwd {
            process.current_dir(cwd);
        }
        for (key, value) in &command.env {
            process.env(key, value);
        }

        let output = process.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CoreError::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Debug, Clone)]
enum MockOutcome {
    Output(String),
    Failure { code: i32, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineMatch {
    Exact(String),
    Prefix(String),
}

impl LineMatch {
    fn matches(&self, line: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == line,
            Self::Prefix(prefix) => line.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Scripted {
    line: LineMatch,
    cwd: Option<PathBuf>,
    outcome: MockOutcome,
    once: bool,
}

impl Scripted {
    fn matches(&self, command: &ShellCommand, line: &str, scoped: bool) -> bool {
        self.line.matches(line)
            && match &self.cwd {
                Some(cwd) => scoped && command.cwd.as_ref() == Some(cwd),
                None => !scoped,
            }
    }
}

/// In-memory command runner for testing
///
/// Responses are scripted by command line (exact or prefix), optionally
/// scoped to a working directory. One-shot scripts are consumed in the order
/// they were registered and take precedence over permanent ones. Among
/// permanent scripts the latest registration wins, and scripts scoped to a
/// directory take precedence over unscoped ones. Unscripted commands succeed
/// with empty output. Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    scripts: Arc<RwLock<Vec<Scripted>>>,
    calls: Arc<RwLock<Vec<ShellCommand>>>,
}

fn failure(stderr: &str) -> MockOutcome {
    MockOutcome::Failure {
        code: 1,
        stderr: stderr.to_string(),
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, cwd: Option<&Path>, line: LineMatch, outcome: MockOutcome, once: bool) -> &Self {
        self.scripts.write().unwrap().push(Scripted {
            line,
            cwd: cwd.map(Path::to_path_buf),
            outcome,
            once,
        });
        self
    }

    /// Answer `line` with `stdout`, whatever the working directory
    pub fn on(&self, line: &str, stdout: &str) -> &Self {
        self.script(None, LineMatch::Exact(line.into()), MockOutcome::Output(stdout.into()), false)
    }

    /// Answer `line` with `stdout` when run inside `cwd`
    pub fn on_in(&self, cwd: impl AsRef<Path>, line: &str, stdout: &str) -> &Self {
        self.script(
            Some(cwd.as_ref()),
            LineMatch::Exact(line.into()),
            MockOutcome::Output(stdout.into()),
            false,
        )
    }

    /// Answer the next call of `line` only
    pub fn on_once(&self, line: &str, stdout: &str) -> &Self {
        self.script(None, LineMatch::Exact(line.into()), MockOutcome::Output(stdout.into()), true)
    }

    /// Answer every command line starting with `prefix`
    pub fn on_prefix(&self, prefix: &str, stdout: &str) -> &Self {
        self.script(None, LineMatch::Prefix(prefix.into()), MockOutcome::Output(stdout.into()), false)
    }

    /// Make `line` exit with status 1
    pub fn fail(&self, line: &str, stderr: &str) -> &Self {
        self.script(None, LineMatch::Exact(line.into()), failure(stderr), false)
    }

    /// Make `line` exit with status 1 when run inside `cwd`
    pub fn fail_in(&self, cwd: impl AsRef<Path>, line: &str, stderr: &str) -> &Self {
        self.script(Some(cwd.as_ref()), LineMatch::Exact(line.into()), failure(stderr), false)
    }

    /// Make every command line starting with `prefix` exit with status 1
    pub fn fail_prefix(&self, prefix: &str, stderr: &str) -> &Self {
        self.script(None, LineMatch::Prefix(prefix.into()), failure(stderr), false)
    }

    /// All recorded commands, in call order
    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.read().unwrap().clone()
    }

    /// All recorded command lines, in call order
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(ShellCommand::line).collect()
    }

    /// Recorded command lines run inside `cwd`
    pub fn lines_in(&self, cwd: impl AsRef<Path>) -> Vec<String> {
        let cwd = cwd.as_ref();
        self.calls()
            .iter()
            .filter(|c| c.cwd.as_deref() == Some(cwd))
            .map(ShellCommand::line)
            .collect()
    }

    pub fn was_called(&self, line: &str) -> bool {
        self.calls().iter().any(|c| c.line() == line)
    }

    /// Forget recorded calls, keeping scripts
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn outcome_for(&self, command: &ShellCommand) -> Option<MockOutcome> {
        let line = command.line();
        let mut scripts = self.scripts.write().unwrap();

        for scoped in [true, false] {
            if let Some(index) = scripts
                .iter()
                .position(|s| s.once && s.matches(command, &line, scoped))
            {
                return Some(scripts.remove(index).outcome);
            }
        }

        for scoped in [true, false] {
            if let Some(script) = scripts
                .iter()
                .rev()
                .find(|s| !s.once && s.matches(command, &line, scoped))
            {
                return Some(script.outcome.clone());
            }
        }

        None
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        self.calls.write().unwrap().push(command.clone());

        match self.outcome_for(command) {
            Some(MockOutcome::Output(stdout)) => Ok(stdout),
            Some(MockOutcome::Failure { code, stderr }) => Err(CoreError::CommandFailed {
                command: command.to_string(),
                code: Some(code),
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let command = ShellCommand::new("git")
            .args(["tag", "-a", "1.0.0"])
            .current_dir("/tmp/repo")
            .env("HTTP_PROXY", "http://proxy");
        assert_eq!(command.to_string(), "git tag -a 1.0.0");
        assert_eq!(command.cwd.as_deref(), Some(Path::new("/tmp/repo")));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_stdout() {
        let runner = ShellRunner::new();
        let output = runner
            .run(&ShellCommand::new("sh").args(["-c", "echo '  hello  '"]))
            .await
            .unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn test_shell_runner_failure() {
        let runner = ShellRunner::new();
        let err = runner
            .run(&ShellCommand::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            CoreError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_scripts() {
        let runner = MockRunner::new();
        runner
            .on("git describe --always --abbrev=0", "1.0.0")
            .on_in("/repo-b", "git describe --always --abbrev=0", "2.0.0")
            .fail("git push origin staging --tags --follow-tags", "rejected");

        let describe = ShellCommand::new("git").args(["describe", "--always", "--abbrev=0"]);
        assert_eq!(runner.run(&describe.clone().current_dir("/repo-a")).await.unwrap(), "1.0.0");
        assert_eq!(runner.run(&describe.clone().current_dir("/repo-b")).await.unwrap(), "2.0.0");
        assert_eq!(runner.run(&ShellCommand::new("git").arg("status")).await.unwrap(), "");

        let push = ShellCommand::new("git").args(["push", "origin", "staging", "--tags", "--follow-tags"]);
        assert!(runner.run(&push).await.is_err());

        assert_eq!(runner.calls().len(), 4);
        assert_eq!(runner.lines_in("/repo-b"), vec!["git describe --always --abbrev=0"]);
        assert!(runner.was_called("git status"));
    }

    #[tokio::test]
    async fn test_mock_runner_once_and_prefix() {
        let runner = MockRunner::new();
        runner
            .on("git rev-parse HEAD", "permanent")
            .on_once("git rev-parse HEAD", "first")
            .on_once("git rev-parse HEAD", "second")
            .fail_prefix("docker push ", "denied");

        let rev_parse = ShellCommand::new("git").args(["rev-parse", "HEAD"]);
        assert_eq!(runner.run(&rev_parse).await.unwrap(), "first");
        assert_eq!(runner.run(&rev_parse).await.unwrap(), "second");
        assert_eq!(runner.run(&rev_parse).await.unwrap(), "permanent");

        let push = ShellCommand::new("docker").args(["push", "acme/api:1.0.0"]);
        assert!(runner.run(&push).await.is_err());
    }
}
