mod common;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use appupdater::config::{load_and_validate, Overrides};
use appupdater::errors::UpdaterError;
use appupdater::types::BackupMode;

use common::*;

const FULL_CONFIG: &str = r#"
[settings]
dry_run = false

[install]
path = "/srv/www"
app_dir = "lms"
owner_user = "www-data"
owner_group = "www-data"

[repository]
url = "https://github.com/moodle/moodle.git"
branch = "MOODLE_405_STABLE"
sync_submodules = false

[backup]
directory = "/srv/backups"
mode = "full"

[database]
dump_directory = "/srv/backups/db"
read_from_app_config = true

[upgrade]
maintenance_mode = true
services = ["apache2", "cron"]
timeout = "2h"

[monitor]
interval = "2s"
stall_samples = 30
low_memory_mb = 1024
critical_memory_mb = 256

[limits]
stage_timeout = "45m"
"#;

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile, Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn loads_a_complete_file() -> TestResult {
    init_tracing();
    let file = write_config(FULL_CONFIG)?;
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.app_path(), PathBuf::from("/srv/www/lms"));
    assert_eq!(cfg.app_config_path(), PathBuf::from("/srv/www/lms/config.php"));
    assert_eq!(cfg.backup.mode, BackupMode::Full);
    assert_eq!(cfg.upgrade.services, vec!["apache2", "cron"]);
    assert_eq!(cfg.upgrade_timeout, Some(Duration::from_secs(7200)));
    assert_eq!(cfg.stage_timeout, Some(Duration::from_secs(45 * 60)));
    assert_eq!(cfg.monitor.interval, Duration::from_secs(2));
    assert_eq!(cfg.monitor.stall_samples, 30);
    assert_eq!(cfg.monitor.low_memory_bytes, 1024 * 1024 * 1024);
    assert_eq!(
        cfg.ownership(),
        Some(("www-data".to_string(), "www-data".to_string()))
    );
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();
    let result = load_and_validate("/definitely/not/here/Updater.toml");
    assert!(matches!(result, Err(UpdaterError::IoError(_))));
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    init_tracing();
    let file = write_config("[install\npath = ")?;
    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(UpdaterError::TomlError(_))));
    Ok(())
}

#[test]
fn bad_duration_names_the_field() -> TestResult {
    init_tracing();
    let file = write_config(&FULL_CONFIG.replace("interval = \"2s\"", "interval = \"2 days\""))?;
    match load_and_validate(file.path()) {
        Err(UpdaterError::ConfigError(msg)) => assert!(msg.contains("[monitor].interval"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn overrides_apply_on_top_of_the_file() -> TestResult {
    init_tracing();
    let file = write_config(FULL_CONFIG)?;
    let cfg = load_and_validate(file.path())?.apply_overrides(Overrides {
        dry_run: true,
        backup_only: true,
        backup_mode: Some(BackupMode::Partial),
        ..Overrides::default()
    })?;

    assert!(cfg.dry_run());
    assert!(!cfg.upgrade.enabled);
    assert_eq!(cfg.backup.mode, BackupMode::Partial);
    Ok(())
}

#[test]
fn overrides_that_leave_nothing_to_do_are_rejected() -> TestResult {
    init_tracing();
    let file = write_config(FULL_CONFIG)?;
    let result = load_and_validate(file.path())?.apply_overrides(Overrides {
        backup_only: true,
        skip_backup: true,
        skip_dump: true,
        ..Overrides::default()
    });
    assert!(matches!(result, Err(UpdaterError::ConfigError(_))));
    Ok(())
}

#[test]
fn database_restart_needs_a_service_command() -> TestResult {
    init_tracing();
    let with_restart = FULL_CONFIG.replace(
        "read_from_app_config = true",
        "read_from_app_config = true\nrestart_service = \"mariadb\"",
    );
    let cfg = load_and_validate(write_config(&with_restart)?.path())?;
    assert_eq!(cfg.database.restart_service.as_deref(), Some("mariadb"));

    let no_command = with_restart.replace(
        "services = [\"apache2\", \"cron\"]",
        "services = []\nservice_command = []",
    );
    match load_and_validate(write_config(&no_command)?.path()) {
        Err(UpdaterError::ConfigError(msg)) => {
            assert!(msg.contains("restart_service"), "{msg}")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn shipped_example_config_is_valid() -> TestResult {
    init_tracing();
    let cfg = appupdater::config::parse_config_str(include_str!("../Updater.example.toml"))?;
    assert!(cfg.dry_run());
    assert_eq!(cfg.app_path(), PathBuf::from("/var/www/moodle"));
    Ok(())
}
