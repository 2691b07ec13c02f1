// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::BackupMode;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [settings]
/// dry_run = false
///
/// [install]
/// path = "/var/www"
/// app_dir = "moodle"
/// owner_user = "www-data"
/// owner_group = "www-data"
///
/// [repository]
/// url = "https://github.com/moodle/moodle.git"
/// branch = "MOODLE_405_STABLE"
///
/// [backup]
/// directory = "/var/backups/moodle"
/// mode = "partial"
///
/// [database]
/// dump_directory = "/var/backups/moodle"
/// read_from_app_config = true
///
/// [upgrade]
/// maintenance_mode = true
/// services = ["apache2"]
///
/// [monitor]
/// interval = "5s"
/// stall_samples = 12
/// ```
///
/// Only `[install]` is required; everything else has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    pub install: InstallSection,

    #[serde(default)]
    pub repository: RepositorySection,

    #[serde(default)]
    pub backup: BackupSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub upgrade: UpgradeSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub limits: LimitsSection,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettingsSection {
    /// Log every action instead of performing it.
    #[serde(default)]
    pub dry_run: bool,
}

/// `[install]` section: where the application lives.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallSection {
    /// Parent directory that contains the application checkout.
    #[serde(default = "default_install_path")]
    pub path: PathBuf,

    /// Name of the checkout directory below `path`.
    #[serde(default = "default_app_dir")]
    pub app_dir: String,

    /// If both are set, the fetched tree is `chown -R user:group`.
    #[serde(default)]
    pub owner_user: Option<String>,

    #[serde(default)]
    pub owner_group: Option<String>,

    /// Application config file, relative to the checkout. Carried over into
    /// every fetched tree.
    #[serde(default = "default_app_config_file")]
    pub app_config_file: String,
}

fn default_install_path() -> PathBuf {
    PathBuf::from("/var/www")
}

fn default_app_dir() -> String {
    "moodle".to_string()
}

fn default_app_config_file() -> String {
    "config.php".to_string()
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            path: default_install_path(),
            app_dir: default_app_dir(),
            owner_user: None,
            owner_group: None,
            app_config_file: default_app_config_file(),
        }
    }
}

/// `[repository]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySection {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub branch: String,

    /// Run `git submodule sync` / `update --init --recursive --remote`
    /// after cloning.
    #[serde(default = "default_true")]
    pub sync_submodules: bool,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: String::new(),
            sync_submodules: true,
        }
    }
}

/// `[backup]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backup_directory")]
    pub directory: PathBuf,

    #[serde(default)]
    pub mode: BackupMode,

    /// rsync `--exclude` patterns, only used for full backups.
    #[serde(default = "default_backup_excludes")]
    pub excludes: Vec<String>,
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from("/var/backups/appupdater")
}

fn default_backup_excludes() -> Vec<String> {
    ["cache", "localcache", "sessions", "temp", "trashdir"]
        .iter()
        .map(|dir| format!("moodledata/{dir}"))
        .collect()
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_backup_directory(),
            mode: BackupMode::default(),
            excludes: default_backup_excludes(),
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backup_directory")]
    pub dump_directory: PathBuf,

    /// Take name/user/password from the application's own config file
    /// instead of the fields below.
    #[serde(default = "default_true")]
    pub read_from_app_config: bool,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub verbose: bool,

    /// Run `mysqlshow` before dumping.
    #[serde(default = "default_true")]
    pub check_connection: bool,

    /// Database service restarted (through `[upgrade].service_command`)
    /// before the dump, e.g. "mariadb".
    #[serde(default)]
    pub restart_service: Option<String>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dump_directory: default_backup_directory(),
            read_from_app_config: true,
            name: None,
            user: None,
            password: None,
            verbose: false,
            check_connection: true,
            restart_service: None,
        }
    }
}

/// `[upgrade]` section.
///
/// Command fields are argument vectors, run from inside the application
/// checkout. An empty `health_check_command` disables both health checks.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub maintenance_mode: bool,

    /// Services stopped before the upgrade and started again afterwards.
    #[serde(default)]
    pub services: Vec<String>,

    #[serde(default = "default_service_command")]
    pub service_command: Vec<String>,

    #[serde(default = "default_upgrade_command")]
    pub upgrade_command: Vec<String>,

    #[serde(default = "default_health_check_command")]
    pub health_check_command: Vec<String>,

    #[serde(default = "default_maintenance_enable_command")]
    pub maintenance_enable_command: Vec<String>,

    #[serde(default = "default_maintenance_disable_command")]
    pub maintenance_disable_command: Vec<String>,

    #[serde(default)]
    pub block_on_failed_precheck: bool,

    #[serde(default)]
    pub block_on_failed_postcheck: bool,

    /// Timeout for the upgrade command itself, e.g. `"2h"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_service_command() -> Vec<String> {
    argv(&["systemctl"])
}

fn default_upgrade_command() -> Vec<String> {
    argv(&["php", "admin/cli/upgrade.php", "--non-interactive"])
}

fn default_health_check_command() -> Vec<String> {
    argv(&["php", "admin/cli/checks.php"])
}

fn default_maintenance_enable_command() -> Vec<String> {
    argv(&["php", "admin/cli/maintenance.php", "--enable"])
}

fn default_maintenance_disable_command() -> Vec<String> {
    argv(&["php", "admin/cli/maintenance.php", "--disable"])
}

impl Default for UpgradeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            maintenance_mode: true,
            services: Vec::new(),
            service_command: default_service_command(),
            upgrade_command: default_upgrade_command(),
            health_check_command: default_health_check_command(),
            maintenance_enable_command: default_maintenance_enable_command(),
            maintenance_disable_command: default_maintenance_disable_command(),
            block_on_failed_precheck: false,
            block_on_failed_postcheck: false,
            timeout: None,
        }
    }
}

/// `[monitor]` section (raw strings; see [`MonitorSettings`]).
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_monitor_interval")]
    pub interval: String,

    /// Consecutive non-growing samples before a stall warning.
    #[serde(default = "default_stall_samples")]
    pub stall_samples: u32,

    #[serde(default = "default_true")]
    pub memory: bool,

    #[serde(default = "default_low_memory_mb")]
    pub low_memory_mb: u64,

    #[serde(default = "default_critical_memory_mb")]
    pub critical_memory_mb: u64,

    #[serde(default)]
    pub low_memory_percent: Option<f64>,

    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: String,
}

fn default_monitor_interval() -> String {
    "5s".to_string()
}

fn default_stall_samples() -> u32 {
    12
}

fn default_low_memory_mb() -> u64 {
    500
}

fn default_critical_memory_mb() -> u64 {
    250
}

fn default_progress_log_interval() -> String {
    "60s".to_string()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval: default_monitor_interval(),
            stall_samples: default_stall_samples(),
            memory: true,
            low_memory_mb: default_low_memory_mb(),
            critical_memory_mb: default_critical_memory_mb(),
            low_memory_percent: None,
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

/// `[limits]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LimitsSection {
    /// Per-command timeout for backup, dump and fetch commands.
    #[serde(default)]
    pub stage_timeout: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Typed monitor settings after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub stall_samples: u32,
    pub memory: bool,
    pub low_memory_bytes: u64,
    pub critical_memory_bytes: u64,
    pub low_memory_percent: Option<f64>,
    pub progress_log_interval: Duration,
}

/// Validated configuration.
///
/// Only constructible via `TryFrom<RawConfigFile>`, so holding one means the
/// checks in `config::validate` passed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: SettingsSection,
    pub install: InstallSection,
    pub repository: RepositorySection,
    pub backup: BackupSection,
    pub database: DatabaseSection,
    pub upgrade: UpgradeSection,
    pub monitor: MonitorSettings,
    pub stage_timeout: Option<Duration>,
    pub upgrade_timeout: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        monitor: MonitorSettings,
        stage_timeout: Option<Duration>,
        upgrade_timeout: Option<Duration>,
    ) -> Self {
        Self {
            settings: raw.settings,
            install: raw.install,
            repository: raw.repository,
            backup: raw.backup,
            database: raw.database,
            upgrade: raw.upgrade,
            monitor,
            stage_timeout,
            upgrade_timeout,
        }
    }

    /// Live application checkout, e.g. `/var/www/moodle`.
    pub fn app_path(&self) -> PathBuf {
        self.install.path.join(&self.install.app_dir)
    }

    /// Application config file inside the live checkout.
    pub fn app_config_path(&self) -> PathBuf {
        self.app_path().join(&self.install.app_config_file)
    }

    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }

    pub fn ownership(&self) -> Option<(String, String)> {
        match (&self.install.owner_user, &self.install.owner_group) {
            (Some(user), Some(group)) => Some((user.clone(), group.clone())),
            _ => None,
        }
    }
}
