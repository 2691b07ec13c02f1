// src/config/mod.rs

//! Configuration loading and validation.
//!
//! The core components never parse files; they receive a validated
//! [`ConfigFile`] (or pieces of it) from here.

pub mod app_config;
pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use app_config::{parse_app_config, resolve_credentials, DbCredentials};
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_config_str};
pub use model::{
    BackupSection, ConfigFile, DatabaseSection, InstallSection, LimitsSection, MonitorSection,
    MonitorSettings, RawConfigFile, RepositorySection, SettingsSection, UpgradeSection,
};

use crate::errors::Result;
use crate::types::BackupMode;

/// Command-line overrides applied on top of a validated config.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub dry_run: bool,
    pub backup_only: bool,
    pub skip_backup: bool,
    pub skip_dump: bool,
    pub backup_mode: Option<BackupMode>,
}

impl ConfigFile {
    /// Apply CLI overrides. Fails if they leave nothing to do.
    pub fn apply_overrides(mut self, overrides: Overrides) -> Result<Self> {
        if overrides.dry_run {
            self.settings.dry_run = true;
        }
        if overrides.backup_only {
            self.upgrade.enabled = false;
        }
        if overrides.skip_backup {
            self.backup.enabled = false;
        }
        if overrides.skip_dump {
            self.database.enabled = false;
        }
        if let Some(mode) = overrides.backup_mode {
            self.backup.mode = mode;
        }
        validate::ensure_has_work(self.backup.enabled, self.database.enabled, self.upgrade.enabled)?;
        Ok(self)
    }
}
