// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::path::PathBuf;

use appupdater::config::{
    BackupSection, ConfigFile, DatabaseSection, InstallSection, LimitsSection, MonitorSection,
    RawConfigFile, RepositorySection, SettingsSection, UpgradeSection,
};
use appupdater::types::BackupMode;

pub const REPO_URL: &str = "https://git.example.org/moodle.git";
pub const BRANCH: &str = "MOODLE_405_STABLE";

/// Builder for `ConfigFile` to simplify test setup.
///
/// Defaults: install at `/var/www/moodle`, backups under `/backups`,
/// explicit database credentials, maintenance mode on, no services, fast
/// monitor intervals.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                settings: SettingsSection::default(),
                install: InstallSection {
                    path: PathBuf::from("/var/www"),
                    ..InstallSection::default()
                },
                repository: RepositorySection {
                    url: REPO_URL.to_string(),
                    branch: BRANCH.to_string(),
                    sync_submodules: false,
                },
                backup: BackupSection {
                    directory: PathBuf::from("/backups"),
                    ..BackupSection::default()
                },
                database: DatabaseSection {
                    dump_directory: PathBuf::from("/backups/db"),
                    read_from_app_config: false,
                    name: Some("moodle".to_string()),
                    user: Some("moodleuser".to_string()),
                    password: Some("secret".to_string()),
                    ..DatabaseSection::default()
                },
                upgrade: UpgradeSection::default(),
                monitor: MonitorSection {
                    interval: "10ms".to_string(),
                    progress_log_interval: "50ms".to_string(),
                    memory: false,
                    ..MonitorSection::default()
                },
                limits: LimitsSection::default(),
            },
        }
    }

    pub fn dry_run(mut self, val: bool) -> Self {
        self.config.settings.dry_run = val;
        self
    }

    pub fn install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.install.path = path.into();
        self
    }

    pub fn backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config.backup.directory = path.clone();
        self.config.database.dump_directory = path;
        self
    }

    pub fn backup(mut self, enabled: bool) -> Self {
        self.config.backup.enabled = enabled;
        self
    }

    pub fn backup_mode(mut self, mode: BackupMode) -> Self {
        self.config.backup.mode = mode;
        self
    }

    pub fn dump(mut self, enabled: bool) -> Self {
        self.config.database.enabled = enabled;
        self
    }

    pub fn upgrade(mut self, enabled: bool) -> Self {
        self.config.upgrade.enabled = enabled;
        self
    }

    pub fn maintenance(mut self, enabled: bool) -> Self {
        self.config.upgrade.maintenance_mode = enabled;
        self
    }

    pub fn services(mut self, names: &[&str]) -> Self {
        self.config.upgrade.services = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn no_health_check(mut self) -> Self {
        self.config.upgrade.health_check_command.clear();
        self
    }

    pub fn block_on_failed_precheck(mut self, val: bool) -> Self {
        self.config.upgrade.block_on_failed_precheck = val;
        self
    }

    pub fn block_on_failed_postcheck(mut self, val: bool) -> Self {
        self.config.upgrade.block_on_failed_postcheck = val;
        self
    }

    pub fn stall_samples(mut self, n: u32) -> Self {
        self.config.monitor.stall_samples = n;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
