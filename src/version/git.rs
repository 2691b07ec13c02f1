// src/version/git.rs

//! Version-control queries and command builders.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::errors::{Result, UpdaterError};
use crate::exec::{CommandSpec, ExitOutcome, ProcessRunner};

/// Default timeout for read-only git queries.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Human commit metadata as printed by `git show -s --format=%ci|%an|%s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub committed_at: String,
    pub author: String,
    pub subject: String,
}

impl CommitMeta {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, '|');
        let committed_at = parts.next()?.trim().to_string();
        let author = parts.next()?.trim().to_string();
        let subject = parts.next()?.trim().to_string();
        if committed_at.is_empty() {
            return None;
        }
        Some(Self {
            committed_at,
            author,
            subject,
        })
    }
}

/// Thin wrapper that runs read-only git queries through a `ProcessRunner`.
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl GitClient {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            timeout: QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn in_dir(&self, dir: &Path) -> CommandSpec {
        CommandSpec::new("git")
            .arg("-C")
            .path_arg(dir)
            .timeout(Some(self.timeout))
    }

    /// Checked-out revision of the checkout at `dir`. A failing or silent
    /// `rev-parse` is an error, not an absent checkout.
    pub async fn head_revision(&self, dir: &Path) -> Result<String> {
        let cmd = self.in_dir(dir).args(["rev-parse", "HEAD"]);
        let out = self.runner.run(&cmd).await?.into_result(&cmd)?;
        let rev = out.stdout.trim();
        if rev.is_empty() {
            return Err(anyhow!("`{cmd}` printed no revision").into());
        }
        Ok(rev.to_string())
    }

    pub async fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let cmd = self.in_dir(dir).args(["rev-parse", "--abbrev-ref", "HEAD"]);
        let out = self.runner.run(&cmd).await?;
        let branch = out.stdout.trim().to_string();
        Ok((out.success() && !branch.is_empty()).then_some(branch))
    }

    /// Tracked files with uncommitted modifications. Untracked files (such
    /// as the app's own config file) don't count.
    pub async fn is_dirty(&self, dir: &Path) -> Result<bool> {
        let cmd = self
            .in_dir(dir)
            .args(["status", "--porcelain", "--untracked-files=no"]);
        let out = self.runner.run(&cmd).await?.into_result(&cmd)?;
        Ok(!out.stdout.trim().is_empty())
    }

    pub async fn commit_details(&self, dir: &Path, rev: &str) -> Result<Option<CommitMeta>> {
        let cmd = self
            .in_dir(dir)
            .args(["show", "-s", "--format=%ci|%an|%s", rev]);
        let out = self.runner.run(&cmd).await?;
        if !out.success() {
            debug!(rev, outcome = %out.outcome, "commit metadata unavailable");
            return Ok(None);
        }
        let meta = CommitMeta::parse(&out.stdout);
        if meta.is_none() {
            warn!(rev, output = %out.stdout.trim(), "unexpected git show output");
        }
        Ok(meta)
    }

    /// Resolve the tip of `branch` on `url` without touching local state.
    pub async fn remote_tip(&self, url: &str, branch: &str) -> Result<String> {
        let wanted = format!("refs/heads/{branch}");
        let cmd = CommandSpec::new("git")
            .args(["ls-remote", url, wanted.as_str()])
            .timeout(Some(self.timeout));
        let out = self.runner.run(&cmd).await?;

        match out.outcome {
            ExitOutcome::Success => {}
            ExitOutcome::NonZeroExit(code) => {
                return Err(UpdaterError::NetworkUnreachable(format!(
                    "git ls-remote {url} exited with code {code}: {}",
                    out.stderr.trim()
                )));
            }
            ExitOutcome::TimedOut => {
                return Err(UpdaterError::NetworkUnreachable(format!(
                    "git ls-remote {url} timed out after {:?}",
                    self.timeout
                )));
            }
        }

        parse_ls_remote(&out.stdout, &wanted).ok_or_else(|| UpdaterError::RemoteRefMissing {
            url: url.to_string(),
            branch: branch.to_string(),
        })
    }
}

fn parse_ls_remote(stdout: &str, wanted: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (rev, name) = line.split_once('\t')?;
        (name.trim() == wanted).then(|| rev.trim().to_string())
    })
}

/// `git clone --branch <branch> <url> <dest>`
pub fn clone_command(url: &str, branch: &str, dest: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .args(["clone", "--branch", branch, url])
        .path_arg(dest)
}

/// `git submodule sync` and `git submodule update --init --recursive --remote`.
pub fn submodule_commands(checkout: &Path) -> [CommandSpec; 2] {
    [
        CommandSpec::new("git")
            .args(["submodule", "sync"])
            .current_dir(checkout),
        CommandSpec::new("git")
            .args(["submodule", "update", "--init", "--recursive", "--remote"])
            .current_dir(checkout),
    ]
}
