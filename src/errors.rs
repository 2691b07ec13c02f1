// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::sequencer::UpgradeState;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited with a non-zero status.
    #[error("`{command}` exited with code {exit_code}{}", stderr_suffix(.stderr))]
    ExecutionFailure {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("remote repository unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("branch '{branch}' not found on {url}")]
    RemoteRefMissing { url: String, branch: String },

    #[error("local working tree at {0} has uncommitted changes")]
    DirtyWorkingTree(String),

    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("invalid upgrade transition: {from:?} -> {to:?}")]
    InvalidTransition { from: UpgradeState, to: UpgradeState },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        // Last line is usually the one that explains the failure.
        let last = trimmed.lines().last().unwrap_or(trimmed);
        format!(": {last}")
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
