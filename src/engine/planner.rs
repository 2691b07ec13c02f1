// src/engine/planner.rs

//! Turns a validated config into stage specs and an upgrade plan.
//!
//! No IO happens here; everything that depends on the system (credentials,
//! whether the live config file exists) is passed in.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone};

use crate::config::{ConfigFile, DbCredentials};
use crate::errors::{Result, UpdaterError};
use crate::exec::CommandSpec;
use crate::fs::FileSystem;
use crate::monitor::{AvailableMemorySource, Detector, FileSizeSource, StageMonitor};
use crate::sequencer::{Activation, MaintenanceCommands, ServiceCommands, UpgradePlan};
use crate::stage::{StageKind, StageSpec, StageStep};
use crate::types::BackupMode;
use crate::version::git;

/// Timestamp format used in backup, dump and checkout names.
pub const STAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub fn timestamp<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(STAMP_FORMAT).to_string()
}

/// Output locations for one run. Every stage writes to its own path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub backup_dest: PathBuf,
    pub staging_dir: PathBuf,
    pub previous_dir: PathBuf,
}

pub struct Planner<'a> {
    cfg: &'a ConfigFile,
    stamp: String,
}

impl<'a> Planner<'a> {
    pub fn new(cfg: &'a ConfigFile, stamp: impl Into<String>) -> Self {
        Self {
            cfg,
            stamp: stamp.into(),
        }
    }

    pub fn paths(&self) -> RunPaths {
        let app = &self.cfg.install.app_dir;
        let parent = &self.cfg.install.path;
        RunPaths {
            backup_dest: self.cfg.backup.directory.join(format!(
                "{app}_bak_{}_{}",
                self.cfg.backup.mode, self.stamp
            )),
            staging_dir: parent.join(format!("{app}_incoming_{}", self.stamp)),
            previous_dir: parent.join(format!("{app}_previous_{}", self.stamp)),
        }
    }

    pub fn dump_file(&self, db_name: &str) -> PathBuf {
        self.cfg
            .database
            .dump_directory
            .join(format!("{db_name}_{}.sql", self.stamp))
    }

    /// `rsync -r` of the checkout (partial) or the whole install parent
    /// (full, minus cache excludes).
    pub fn backup_stage(&self) -> StageSpec {
        let backup = &self.cfg.backup;
        let source = match backup.mode {
            BackupMode::Partial => self.cfg.app_path(),
            BackupMode::Full => self.cfg.install.path.clone(),
        };
        // Trailing slash: copy the contents, not the directory itself.
        let source = format!("{}/", source.display().to_string().trim_end_matches('/'));

        let mut rsync = CommandSpec::new("rsync").arg("-r");
        if backup.mode == BackupMode::Full {
            // Staged and previous checkouts are siblings of the live one;
            // anchored to the transfer root.
            let app = &self.cfg.install.app_dir;
            for kind in ["incoming", "previous"] {
                rsync = rsync.args(["--exclude".to_string(), format!("/{app}_{kind}_*")]);
            }
            for output in [&backup.directory, &self.cfg.database.dump_directory] {
                if let Ok(rel) = output.strip_prefix(&self.cfg.install.path) {
                    if !rel.as_os_str().is_empty() {
                        rsync = rsync.args(["--exclude".to_string(), format!("/{}", rel.display())]);
                    }
                }
            }
            for pattern in &backup.excludes {
                rsync = rsync.args(["--exclude", pattern.as_str()]);
            }
        }
        let rsync = rsync
            .arg(source)
            .path_arg(&self.paths().backup_dest)
            .timeout(self.cfg.stage_timeout);

        StageSpec::new(StageKind::Backup)
            .label(format!("backup ({})", backup.mode))
            .step(StageStep::CreateDir(backup.directory.clone()))
            .run(rsync)
    }

    fn mysql_client(&self, program: &str, creds: &DbCredentials) -> CommandSpec {
        let mut cmd = CommandSpec::new(program).args(["-u", creds.user.as_str()]);
        if let Some(ref host) = creds.host {
            cmd = cmd.args(["-h", host.as_str()]);
        }
        if let Some(ref password) = creds.password {
            cmd = cmd.env("MYSQL_PWD", password.as_str());
        }
        cmd.timeout(self.cfg.stage_timeout)
    }

    /// `<service_command> <action> <name>`, or `None` when no service
    /// command is configured.
    fn service(&self, action: &str, name: &str) -> Option<CommandSpec> {
        CommandSpec::from_argv(&self.cfg.upgrade.service_command)
            .map(|cmd| cmd.args([action, name]).timeout(self.cfg.stage_timeout))
    }

    /// Optional database service restart and connection check, then
    /// `mysqldump` streamed into the dump file. With `monitored`, a growth monitor watches the file and a
    /// memory monitor watches the host.
    pub fn dump_stage(
        &self,
        creds: &DbCredentials,
        fs: Arc<dyn FileSystem>,
        monitored: bool,
    ) -> StageSpec {
        let db = &self.cfg.database;
        let dump_file = self.dump_file(&creds.name);

        let mut stage = StageSpec::new(StageKind::DbDump)
            .label(format!("db-dump ({})", creds.name))
            .step(StageStep::CreateDir(db.dump_directory.clone()));

        if let Some(ref svc) = db.restart_service {
            for action in ["restart", "status"] {
                if let Some(cmd) = self.service(action, svc) {
                    stage = stage.run(cmd);
                }
            }
        }

        if db.check_connection {
            stage = stage.run(self.mysql_client("mysqlshow", creds).arg(creds.name.as_str()));
        }

        let mut dump = self.mysql_client("mysqldump", creds).args([
            "--single-transaction",
            "--skip-lock-tables",
            "--max_allowed_packet=100M",
            "--quick",
            "--databases",
            creds.name.as_str(),
        ]);
        if db.verbose {
            dump = dump.arg("--verbose");
        }
        stage = stage.run(dump.stdout_to(&dump_file));

        if !monitored {
            return stage;
        }

        let m = &self.cfg.monitor;
        stage = stage.monitor(
            StageMonitor::new(
                Box::new(FileSizeSource::new(&dump_file, fs)),
                Detector::growth(m.stall_samples),
                m.interval,
            )
            .log_progress_every(m.progress_log_interval),
        );
        if m.memory {
            stage = stage.monitor(StageMonitor::new(
                Box::new(AvailableMemorySource::new()),
                Detector::resource(
                    m.low_memory_bytes,
                    m.critical_memory_bytes,
                    m.low_memory_percent,
                ),
                m.interval,
            ));
        }
        stage
    }

    /// Clone into the staging directory next to the live checkout.
    pub fn fetch_stage(&self, carry_app_config: bool) -> StageSpec {
        let repo = &self.cfg.repository;
        let staging = self.paths().staging_dir;
        let timeout = self.cfg.stage_timeout;

        let mut stage = StageSpec::new(StageKind::Fetch)
            .label(format!("fetch ({})", repo.branch))
            .run(git::clone_command(&repo.url, &repo.branch, &staging).timeout(timeout));

        if repo.sync_submodules {
            for cmd in git::submodule_commands(&staging) {
                stage = stage.run(cmd.timeout(timeout));
            }
        }

        if carry_app_config {
            stage = stage.step(StageStep::CopyFile {
                from: self.cfg.app_config_path(),
                to: staging.join(&self.cfg.install.app_config_file),
            });
        }

        if let Some((user, group)) = self.cfg.ownership() {
            stage = stage.run(
                CommandSpec::new("chown")
                    .args(["-R".to_string(), format!("{user}:{group}")])
                    .path_arg(&staging)
                    .timeout(timeout),
            );
        }
        stage
    }

    /// Commands for the Upgrade Sequencer. With `activate`, the staged
    /// checkout is swapped in right before the upgrade command runs.
    pub fn upgrade_plan(&self, activate: bool) -> Result<UpgradePlan> {
        let up = &self.cfg.upgrade;
        let app_path = self.cfg.app_path();
        let timeout = self.cfg.stage_timeout;

        let in_app = |argv: &[String], what: &str| -> Result<CommandSpec> {
            CommandSpec::from_argv(argv)
                .map(|cmd| cmd.current_dir(&app_path).timeout(timeout))
                .ok_or_else(|| UpdaterError::ConfigError(format!("[upgrade].{what} is empty")))
        };

        let upgrade = in_app(&up.upgrade_command, "upgrade_command")?
            .timeout(self.cfg.upgrade_timeout)
            .echo_output(true);

        let mut plan = UpgradePlan::new(upgrade);
        plan.block_on_failed_precheck = up.block_on_failed_precheck;
        plan.block_on_failed_postcheck = up.block_on_failed_postcheck;

        if !up.health_check_command.is_empty() {
            plan.health_check = Some(in_app(&up.health_check_command, "health_check_command")?);
        }

        if up.maintenance_mode {
            plan.maintenance = Some(MaintenanceCommands {
                enable: in_app(&up.maintenance_enable_command, "maintenance_enable_command")?,
                disable: in_app(&up.maintenance_disable_command, "maintenance_disable_command")?,
            });
        }

        for name in &up.services {
            let service = |action: &str| -> Result<CommandSpec> {
                self.service(action, name).ok_or_else(|| {
                    UpdaterError::ConfigError("[upgrade].service_command is empty".to_string())
                })
            };
            plan.services.push(ServiceCommands {
                name: name.clone(),
                stop: service("stop")?,
                start: service("start")?,
            });
        }

        if activate {
            let paths = self.paths();
            plan.activation = Some(Activation {
                live: app_path.clone(),
                staged: paths.staging_dir,
                previous: paths.previous_dir,
            });
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config_str;
    use crate::fs::MockFileSystem;

    const STAMP: &str = "2025-03-01-02-00-00";

    fn cfg(extra: &str) -> ConfigFile {
        let src = format!(
            r#"
[install]
path = "/var/www"
app_dir = "moodle"

[repository]
url = "https://git.example.org/moodle.git"
branch = "MOODLE_405_STABLE"

[backup]
directory = "/backups"

[database]
dump_directory = "/backups/db"
{extra}
"#
        );
        parse_config_str(&src).unwrap()
    }

    fn creds(password: Option<&str>) -> DbCredentials {
        DbCredentials {
            name: "moodle".into(),
            user: "moodleuser".into(),
            password: password.map(String::from),
            host: Some("db.local".into()),
        }
    }

    #[test]
    fn partial_backup_copies_checkout_contents() {
        let c = cfg("");
        let stage = Planner::new(&c, STAMP).backup_stage();
        let rsync: Vec<_> = stage.commands().collect();
        assert_eq!(rsync.len(), 1);
        assert_eq!(
            rsync[0].args,
            vec![
                "-r",
                "/var/www/moodle/",
                "/backups/moodle_bak_partial_2025-03-01-02-00-00"
            ]
        );
    }

    #[test]
    fn full_backup_excludes_caches() {
        let src = r#"
[install]
path = "/var/www"
[repository]
url = "u"
branch = "b"
[backup]
directory = "/backups"
mode = "full"
"#;
        let c = parse_config_str(src).unwrap();
        let stage = Planner::new(&c, STAMP).backup_stage();
        let rsync = stage.commands().next().unwrap();
        assert!(rsync.args.contains(&"moodledata/cache".to_string()));
        assert!(rsync.args.contains(&"/var/www/".to_string()));
        assert_eq!(stage.label, "backup (full)");
    }

    #[test]
    fn full_backup_skips_staged_and_previous_checkouts() {
        let src = r#"
[install]
path = "/var/www"
[repository]
url = "u"
branch = "b"
[backup]
directory = "/var/www/backups"
mode = "full"
"#;
        let c = parse_config_str(src).unwrap();
        let planner = Planner::new(&c, STAMP);
        let stage = planner.backup_stage();
        let rsync = stage.commands().next().unwrap();
        let excludes: Vec<&str> = rsync
            .args
            .windows(2)
            .filter(|w| w[0] == "--exclude")
            .map(|w| w[1].as_str())
            .collect();

        let paths = planner.paths();
        for dir in [&paths.staging_dir, &paths.previous_dir] {
            assert!(dir.starts_with(&c.install.path));
            let name = dir.file_name().unwrap().to_string_lossy().into_owned();
            let covered = excludes.iter().any(|p| {
                p.strip_prefix('/')
                    .and_then(|p| p.strip_suffix('*'))
                    .is_some_and(|prefix| name.starts_with(prefix))
            });
            assert!(covered, "{name} not excluded by {excludes:?}");
        }
        assert!(excludes.contains(&"/backups"));
    }

    #[test]
    fn dump_password_goes_through_environment() {
        let c = cfg("");
        let stage = Planner::new(&c, STAMP).dump_stage(
            &creds(Some("s3cret")),
            Arc::new(MockFileSystem::new()),
            true,
        );
        let cmds: Vec<_> = stage.commands().collect();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].program, "mysqlshow");
        let dump = cmds[1];
        assert_eq!(dump.program, "mysqldump");
        assert!(dump.args.iter().all(|a| !a.contains("s3cret")));
        assert!(!dump.to_string().contains("s3cret"));
        assert_eq!(dump.env, vec![("MYSQL_PWD".to_string(), "s3cret".to_string())]);
        assert!(dump.mentions("--single-transaction"));
        assert!(dump.mentions("db.local"));
        assert_eq!(
            dump.stdout_to.as_deref(),
            Some(std::path::Path::new("/backups/db/moodle_2025-03-01-02-00-00.sql"))
        );
        assert_eq!(stage.monitors.len(), 2);
    }

    #[test]
    fn unmonitored_dump_without_connection_check() {
        let src = r#"
[install]
path = "/var/www"
[repository]
url = "u"
branch = "b"
[database]
check_connection = false
verbose = true
"#;
        let c = parse_config_str(src).unwrap();
        let stage =
            Planner::new(&c, STAMP).dump_stage(&creds(None), Arc::new(MockFileSystem::new()), false);
        let cmds: Vec<_> = stage.commands().collect();
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].mentions("--verbose"));
        assert!(cmds[0].env.is_empty());
        assert!(stage.monitors.is_empty());
    }

    #[test]
    fn dump_restarts_database_service_first() {
        let c = cfg("restart_service = \"mariadb\"\n[upgrade]\nservice_command = [\"service\"]");
        let stage = Planner::new(&c, STAMP).dump_stage(
            &creds(None),
            Arc::new(MockFileSystem::new()),
            false,
        );
        let cmds: Vec<_> = stage.commands().map(|c| c.to_string()).collect();
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0], "service restart mariadb");
        assert_eq!(cmds[1], "service status mariadb");
        assert!(cmds[2].starts_with("mysqlshow"));
        assert!(cmds[3].starts_with("mysqldump"));
    }

    #[test]
    fn fetch_clones_into_staging_and_carries_config() {
        let src = r#"
[install]
path = "/var/www"
owner_user = "www-data"
owner_group = "www-data"
[repository]
url = "https://git.example.org/moodle.git"
branch = "MOODLE_405_STABLE"
"#;
        let c = parse_config_str(src).unwrap();
        let stage = Planner::new(&c, STAMP).fetch_stage(true);
        let staging = "/var/www/moodle_incoming_2025-03-01-02-00-00";

        let cmds: Vec<_> = stage.commands().collect();
        assert_eq!(cmds[0].program, "git");
        assert!(cmds[0].mentions(staging));
        assert_eq!(cmds.len(), 4, "clone, submodule sync, submodule update, chown");
        assert_eq!(cmds[3].args, vec!["-R", "www-data:www-data", staging]);
        assert!(stage.steps.contains(&StageStep::CopyFile {
            from: "/var/www/moodle/config.php".into(),
            to: PathBuf::from(staging).join("config.php"),
        }));
    }

    #[test]
    fn upgrade_plan_runs_inside_checkout() {
        let c = cfg("[upgrade]\nservices = [\"apache2\", \"cron\"]\ntimeout = \"2h\"");
        let plan = Planner::new(&c, STAMP).upgrade_plan(true).unwrap();

        assert_eq!(plan.upgrade.cwd.as_deref(), Some(std::path::Path::new("/var/www/moodle")));
        assert!(plan.upgrade.echo_output);
        assert_eq!(plan.upgrade.timeout, Some(std::time::Duration::from_secs(7200)));
        assert!(plan.maintenance.is_some());
        assert!(plan.health_check.is_some());
        assert_eq!(plan.services.len(), 2);
        assert_eq!(plan.services[0].stop.args, vec!["stop", "apache2"]);
        assert_eq!(plan.services[1].start.args, vec!["start", "cron"]);
        let act = plan.activation.unwrap();
        assert_eq!(act.previous, PathBuf::from("/var/www/moodle_previous_2025-03-01-02-00-00"));
    }
}
