// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, MonitorSettings, RawConfigFile};
use crate::errors::{Result, UpdaterError};

const MB: u64 = 1024 * 1024;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::UpdaterError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let monitor = monitor_settings(&raw)?;
        let stage_timeout = optional_duration("[limits].stage_timeout", &raw.limits.stage_timeout)?;
        let upgrade_timeout = optional_duration("[upgrade].timeout", &raw.upgrade.timeout)?;
        Ok(ConfigFile::new_unchecked(
            raw,
            monitor,
            stage_timeout,
            upgrade_timeout,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_work(cfg.backup.enabled, cfg.database.enabled, cfg.upgrade.enabled)?;
    validate_install(cfg)?;
    validate_repository(cfg)?;
    validate_database(cfg)?;
    validate_upgrade(cfg)?;
    Ok(())
}

/// At least one of backup, dump or upgrade must be enabled.
pub(crate) fn ensure_has_work(backup: bool, dump: bool, upgrade: bool) -> Result<()> {
    if !backup && !dump && !upgrade {
        return Err(UpdaterError::ConfigError(
            "nothing to do: backup, database dump and upgrade are all disabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_install(cfg: &RawConfigFile) -> Result<()> {
    let app_dir = cfg.install.app_dir.trim();
    if app_dir.is_empty() || app_dir.contains('/') || app_dir == "." || app_dir == ".." {
        return Err(UpdaterError::ConfigError(format!(
            "[install].app_dir must be a plain directory name (got {:?})",
            cfg.install.app_dir
        )));
    }
    if cfg.install.owner_user.is_some() != cfg.install.owner_group.is_some() {
        return Err(UpdaterError::ConfigError(
            "[install].owner_user and [install].owner_group must be set together".to_string(),
        ));
    }
    Ok(())
}

fn validate_repository(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.upgrade.enabled {
        return Ok(());
    }
    if cfg.repository.url.trim().is_empty() {
        return Err(UpdaterError::ConfigError(
            "[repository].url is required when upgrades are enabled".to_string(),
        ));
    }
    if cfg.repository.branch.trim().is_empty() {
        return Err(UpdaterError::ConfigError(
            "[repository].branch is required when upgrades are enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_database(cfg: &RawConfigFile) -> Result<()> {
    let db = &cfg.database;
    if let Some(svc) = db.restart_service.as_deref().filter(|_| db.enabled) {
        if svc.trim().is_empty() {
            return Err(UpdaterError::ConfigError(
                "[database].restart_service must not be empty".to_string(),
            ));
        }
        if cfg.upgrade.service_command.is_empty() {
            return Err(UpdaterError::ConfigError(
                "[upgrade].service_command must not be empty when [database].restart_service is set"
                    .to_string(),
            ));
        }
    }
    if !db.enabled || db.read_from_app_config {
        return Ok(());
    }
    if db.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
        return Err(UpdaterError::ConfigError(
            "[database].name is required when read_from_app_config = false".to_string(),
        ));
    }
    if db.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
        return Err(UpdaterError::ConfigError(
            "[database].user is required when read_from_app_config = false".to_string(),
        ));
    }
    Ok(())
}

fn validate_upgrade(cfg: &RawConfigFile) -> Result<()> {
    let up = &cfg.upgrade;
    if !up.enabled {
        return Ok(());
    }
    if up.upgrade_command.is_empty() {
        return Err(UpdaterError::ConfigError(
            "[upgrade].upgrade_command must not be empty".to_string(),
        ));
    }
    if up.maintenance_mode
        && (up.maintenance_enable_command.is_empty() || up.maintenance_disable_command.is_empty())
    {
        return Err(UpdaterError::ConfigError(
            "maintenance_mode = true needs both maintenance_enable_command and maintenance_disable_command"
                .to_string(),
        ));
    }
    if !up.services.is_empty() && up.service_command.is_empty() {
        return Err(UpdaterError::ConfigError(
            "[upgrade].service_command must not be empty when services are listed".to_string(),
        ));
    }
    Ok(())
}

fn monitor_settings(cfg: &RawConfigFile) -> Result<MonitorSettings> {
    let m = &cfg.monitor;

    let interval = required_duration("[monitor].interval", &m.interval)?;
    let progress_log_interval =
        required_duration("[monitor].progress_log_interval", &m.progress_log_interval)?;

    if m.stall_samples == 0 {
        return Err(UpdaterError::ConfigError(
            "[monitor].stall_samples must be >= 1 (got 0)".to_string(),
        ));
    }
    if m.critical_memory_mb > m.low_memory_mb {
        return Err(UpdaterError::ConfigError(format!(
            "[monitor].critical_memory_mb ({}) must not exceed low_memory_mb ({})",
            m.critical_memory_mb, m.low_memory_mb
        )));
    }
    if let Some(pct) = m.low_memory_percent {
        if !(0.0..=100.0).contains(&pct) {
            return Err(UpdaterError::ConfigError(format!(
                "[monitor].low_memory_percent must be within 0..=100 (got {pct})"
            )));
        }
    }

    Ok(MonitorSettings {
        interval,
        stall_samples: m.stall_samples,
        memory: m.memory,
        low_memory_bytes: m.low_memory_mb * MB,
        critical_memory_bytes: m.critical_memory_mb * MB,
        low_memory_percent: m.low_memory_percent,
        progress_log_interval,
    })
}

fn required_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| UpdaterError::ConfigError(format!("{field}: {e}")))?;
    if dur.is_zero() {
        return Err(UpdaterError::ConfigError(format!("{field} must be greater than zero")));
    }
    Ok(dur)
}

fn optional_duration(field: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|v| required_duration(field, v))
        .transpose()
}
