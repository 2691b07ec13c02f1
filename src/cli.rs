// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::Overrides;
use crate::types::BackupMode;

/// Command-line arguments for `appupdater`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "appupdater",
    version,
    about = "Back up, fetch and upgrade a self-hosted web application.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Updater.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `APPUPDATER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log every action instead of performing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Only take backups; skip the version check and upgrade.
    #[arg(long)]
    pub backup_only: bool,

    /// Skip the directory backup.
    #[arg(long)]
    pub skip_backup: bool,

    /// Skip the database dump.
    #[arg(long)]
    pub skip_dump: bool,

    /// Override `[backup].mode`.
    #[arg(long, value_enum, value_name = "MODE")]
    pub backup_mode: Option<BackupModeArg>,
}

impl CliArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            dry_run: self.dry_run,
            backup_only: self.backup_only,
            skip_backup: self.skip_backup,
            skip_dump: self.skip_dump,
            backup_mode: self.backup_mode.map(BackupMode::from),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum BackupModeArg {
    Partial,
    Full,
}

impl From<BackupModeArg> for BackupMode {
    fn from(arg: BackupModeArg) -> Self {
        match arg {
            BackupModeArg::Partial => BackupMode::Partial,
            BackupModeArg::Full => BackupMode::Full,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
