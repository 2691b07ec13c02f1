// src/version/comparator.rs

//! Decide whether an update is applicable by comparing the local checkout
//! with the remote branch tip.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::version::git::{CommitMeta, GitClient};
use crate::version::release::{detect_release, AppRelease};

/// Remote repository and branch to compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub url: String,
    pub branch: String,
}

/// Everything known about local and remote versions.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub branch: String,
    /// `None` when the install directory is missing or not a checkout.
    pub local_revision: Option<String>,
    pub local_branch: Option<String>,
    pub remote_revision: String,
    pub local_commit: Option<CommitMeta>,
    pub remote_commit: Option<CommitMeta>,
    pub dirty: bool,
    pub local_release: Option<AppRelease>,
}

/// Outcome of the version gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    Applicable,
    AlreadyUpToDate,
    /// Local tracked files were modified; updating would discard them.
    DirtyWorkingTree,
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateDecision::Applicable => write!(f, "update available"),
            UpdateDecision::AlreadyUpToDate => write!(f, "already up to date"),
            UpdateDecision::DirtyWorkingTree => write!(f, "local changes present"),
        }
    }
}

impl VersionInfo {
    /// A dirty tree wins over "up to date" so that local edits are always
    /// reported.
    pub fn decision(&self) -> UpdateDecision {
        if self.dirty {
            return UpdateDecision::DirtyWorkingTree;
        }
        match self.local_revision {
            Some(ref local) if local == &self.remote_revision => UpdateDecision::AlreadyUpToDate,
            _ => UpdateDecision::Applicable,
        }
    }
}

pub fn is_update_applicable(info: &VersionInfo) -> bool {
    info.decision() == UpdateDecision::Applicable
}

/// Runs the read-only queries behind a [`VersionInfo`].
pub struct VersionComparator {
    git: GitClient,
    fs: Arc<dyn FileSystem>,
}

impl VersionComparator {
    pub fn new(git: GitClient, fs: Arc<dyn FileSystem>) -> Self {
        Self { git, fs }
    }

    /// Fails with `NetworkUnreachable` or `RemoteRefMissing` if the remote
    /// tip cannot be resolved. Only a missing directory or `.git` counts as
    /// a fresh install; an existing checkout that git can't read is an error.
    pub async fn compare(&self, install_dir: &Path, remote: &RemoteRef) -> Result<VersionInfo> {
        let checkout = self.fs.is_dir(install_dir) && self.fs.exists(&install_dir.join(".git"));
        let local_revision = if checkout {
            Some(self.git.head_revision(install_dir).await?)
        } else {
            debug!(dir = %install_dir.display(), "no local checkout");
            None
        };

        let (local_branch, dirty, local_commit) = match local_revision {
            Some(ref rev) => (
                self.git.current_branch(install_dir).await?,
                self.git.is_dirty(install_dir).await?,
                self.git.commit_details(install_dir, rev).await?,
            ),
            None => (None, false, None),
        };

        let remote_revision = self.git.remote_tip(&remote.url, &remote.branch).await?;

        // Metadata for the remote tip is only available if it is already
        // known locally (e.g. after a previous fetch).
        let remote_commit = match local_revision {
            Some(ref local) if local != &remote_revision => self
                .git
                .commit_details(install_dir, &remote_revision)
                .await
                .unwrap_or(None),
            Some(_) => local_commit.clone(),
            None => None,
        };

        let info = VersionInfo {
            branch: remote.branch.clone(),
            local_revision,
            local_branch,
            remote_revision,
            local_commit,
            remote_commit,
            dirty,
            local_release: detect_release(self.fs.as_ref(), install_dir),
        };
        log_version_info(&info);
        Ok(info)
    }
}

fn short(rev: &str) -> &str {
    rev.get(..10).unwrap_or(rev)
}

fn log_version_info(info: &VersionInfo) {
    let local = info.local_revision.as_deref().map(short).unwrap_or("none");
    let release = info
        .local_release
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        branch = %info.branch,
        local = local,
        remote = short(&info.remote_revision),
        release = %release,
        "version check"
    );
    if let Some(ref meta) = info.local_commit {
        info!(date = %meta.committed_at, author = %meta.author, "local commit: {}", meta.subject);
    }
    if let Some(ref meta) = info.remote_commit {
        info!(date = %meta.committed_at, author = %meta.author, "remote commit: {}", meta.subject);
    }
    if let Some(ref local_branch) = info.local_branch {
        if local_branch != &info.branch && local_branch != "HEAD" {
            warn!(local = %local_branch, configured = %info.branch, "checkout is on a different branch");
        }
    }
    match info.decision() {
        UpdateDecision::DirtyWorkingTree => {
            warn!("local checkout has uncommitted changes to tracked files")
        }
        decision => info!("{decision}"),
    }
}
