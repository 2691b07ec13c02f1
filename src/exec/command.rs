// src/exec/command.rs

//! Argument-vector command descriptions and process results.
//!
//! Commands are never passed through a shell: `program` and `args` go to the
//! OS as-is, so configuration values cannot inject extra commands.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, UpdaterError};

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment variables. Values are never logged.
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Stream stdout into this file instead of capturing it.
    pub stdout_to: Option<PathBuf>,
    /// Log output lines at info/warn while the command runs instead of debug.
    pub echo_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
            stdout_to: None,
            echo_output: false,
        }
    }

    /// Build from an argument vector whose first element is the program.
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.as_ref()).args(rest.iter().map(|a| a.as_ref())))
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

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// True if `needle` appears as the program or any argument.
    pub fn mentions(&self, needle: &str) -> bool {
        self.program == needle || self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        if let Some(ref out) = self.stdout_to {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.contains(char::is_whitespace) {
        format!("'{}'", s.replace('\'', "'\\''"))
    } else {
        s.to_string()
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Non-zero exit. Signal termination is reported as `-1`.
    NonZeroExit(i32),
    /// The timeout elapsed and the child was killed.
    TimedOut,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            ExitOutcome::Success
        } else {
            ExitOutcome::NonZeroExit(code)
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Success => Some(0),
            ExitOutcome::NonZeroExit(code) => Some(*code),
            ExitOutcome::TimedOut => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "exit 0"),
            ExitOutcome::NonZeroExit(code) => write!(f, "exit {code}"),
            ExitOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of running a command.
///
/// A non-zero exit is data at this layer; callers decide whether it is a
/// failure (see [`ProcessOutput::into_result`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// Synthetic result used by dry-run mode and fakes.
    pub fn synthetic_success() -> Self {
        Self {
            outcome: ExitOutcome::Success,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == ExitOutcome::Success
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.exit_code()
    }

    /// Treat anything but a clean exit as an error.
    pub fn into_result(self, cmd: &CommandSpec) -> Result<ProcessOutput> {
        match self.outcome {
            ExitOutcome::Success => Ok(self),
            ExitOutcome::NonZeroExit(exit_code) => Err(UpdaterError::ExecutionFailure {
                command: cmd.to_string(),
                exit_code,
                stderr: self.stderr,
            }),
            ExitOutcome::TimedOut => Err(UpdaterError::TimedOut {
                command: cmd.to_string(),
                timeout: cmd.timeout.unwrap_or(self.duration),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandSpec::new("git")
            .args(["commit", "-m", "two words"])
            .current_dir("/srv");
        assert_eq!(cmd.to_string(), "git commit -m 'two words'");
    }

    #[test]
    fn display_never_shows_environment_values() {
        let cmd = CommandSpec::new("mysqldump")
            .args(["-u", "moodle", "moodle"])
            .env("MYSQL_PWD", "hunter2")
            .stdout_to("/backups/moodle.sql");
        let shown = cmd.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.ends_with("> /backups/moodle.sql"));
    }

    #[test]
    fn from_argv_splits_program() {
        let cmd = CommandSpec::from_argv(&["php", "admin/cli/checks.php"]).unwrap();
        assert_eq!(cmd.program, "php");
        assert_eq!(cmd.args, vec!["admin/cli/checks.php".to_string()]);
        assert!(CommandSpec::from_argv::<&str>(&[]).is_none());
    }

    #[test]
    fn into_result_distinguishes_timeout_from_exit() {
        let cmd = CommandSpec::new("rsync").timeout(Some(Duration::from_secs(3)));

        let failed = ProcessOutput {
            outcome: ExitOutcome::NonZeroExit(23),
            stdout: String::new(),
            stderr: "partial transfer".to_string(),
            duration: Duration::from_millis(10),
        };
        match failed.into_result(&cmd) {
            Err(UpdaterError::ExecutionFailure { exit_code, .. }) => assert_eq!(exit_code, 23),
            other => panic!("expected ExecutionFailure, got {other:?}"),
        }

        let timed_out = ProcessOutput {
            outcome: ExitOutcome::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_secs(3),
        };
        match timed_out.into_result(&cmd) {
            Err(UpdaterError::TimedOut { timeout, .. }) => {
                assert_eq!(timeout, Duration::from_secs(3))
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }
}
