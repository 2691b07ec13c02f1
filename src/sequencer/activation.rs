// src/sequencer/activation.rs

//! Swap a staged checkout into the live location.

use std::path::PathBuf;

use tracing::{error, info};

use crate::errors::{Result, UpdaterError};
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub live: PathBuf,
    pub staged: PathBuf,
    /// Where the current live tree is moved to.
    pub previous: PathBuf,
}

impl Activation {
    /// Move `live` aside and `staged` into its place. If the second rename
    /// fails the first one is reverted, so the live path is never left
    /// empty by a half-done swap.
    pub fn apply(&self, fs: &dyn FileSystem, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(
                staged = %self.staged.display(),
                live = %self.live.display(),
                "[dry-run] would activate staged checkout"
            );
            return Ok(());
        }

        if !fs.is_dir(&self.staged) {
            return Err(UpdaterError::UpgradeFailed(format!(
                "staged checkout {} does not exist",
                self.staged.display()
            )));
        }

        let had_live = fs.exists(&self.live);
        if had_live {
            fs.rename(&self.live, &self.previous).map_err(|e| {
                UpdaterError::UpgradeFailed(format!("cannot move live checkout aside: {e:#}"))
            })?;
        }

        if let Err(e) = fs.rename(&self.staged, &self.live) {
            error!(error = %e, "activating staged checkout failed");
            if had_live {
                if let Err(revert) = fs.rename(&self.previous, &self.live) {
                    error!(
                        previous = %self.previous.display(),
                        error = %revert,
                        "could not restore previous checkout; restore it manually"
                    );
                }
            }
            return Err(UpdaterError::UpgradeFailed(format!(
                "cannot activate staged checkout: {e:#}"
            )));
        }

        info!(
            live = %self.live.display(),
            previous = %self.previous.display(),
            "staged checkout activated"
        );
        Ok(())
    }
}
