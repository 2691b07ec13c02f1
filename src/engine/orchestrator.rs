// src/engine/orchestrator.rs

//! Async shell that runs one update cycle:
//! version gate → concurrent stages → upgrade sequence → report.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use tracing::{error, info, warn};

use crate::config::{resolve_credentials, ConfigFile};
use crate::coordinator::{BatchOutcome, TaskCoordinator};
use crate::errors::Result;
use crate::exec::{action_runner, ProcessRunner};
use crate::fs::FileSystem;
use crate::report::{build_report, ReportInput, RunReport};
use crate::sequencer::{SequencerOutcome, UpgradeSequencer};
use crate::stage::{StageContext, StageKind, StageOutcome, StageResult};
use crate::version::{
    detect_release, GitClient, RemoteRef, UpdateDecision, VersionComparator, VersionInfo,
};

use super::planner::{timestamp, Planner};

/// Outcome of the version gate.
enum Gate {
    /// Upgrades are disabled for this run.
    NotRequested,
    Checked(VersionInfo),
    /// The remote could not be queried; backups still run.
    Unavailable(String),
}

pub struct Orchestrator {
    cfg: ConfigFile,
    /// Read-only queries; runs for real even in dry-run mode.
    query_runner: Arc<dyn ProcessRunner>,
    /// Everything that changes the system.
    action_runner: Arc<dyn ProcessRunner>,
    fs: Arc<dyn FileSystem>,
}

impl Orchestrator {
    pub fn new(cfg: ConfigFile, runner: Arc<dyn ProcessRunner>, fs: Arc<dyn FileSystem>) -> Self {
        let action_runner = action_runner(Arc::clone(&runner), cfg.dry_run());
        Self {
            cfg,
            query_runner: runner,
            action_runner,
            fs,
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let clock = Instant::now();
        let dry_run = self.cfg.dry_run();
        if dry_run {
            warn!("dry run: commands are logged, not executed");
        }
        info!(app = %self.cfg.app_path().display(), "update run started");

        let gate = self.check_version().await;
        let (decision, update_error) = match gate {
            Gate::NotRequested => (None, None),
            Gate::Checked(ref info) => (Some(info.decision()), None),
            Gate::Unavailable(ref e) => (None, Some(e.clone())),
        };
        let applicable = decision == Some(UpdateDecision::Applicable);

        let planner = Planner::new(&self.cfg, timestamp(Local::now()));
        let batch = self.run_stages(&planner, applicable).await;

        let mut update_error = update_error;
        let upgrade = if applicable {
            match self.upgrade_gate(&planner, &batch) {
                Ok(()) => Some(self.run_upgrade(&planner).await?),
                Err(reason) => {
                    warn!("{reason}; upgrade not started");
                    update_error = Some(reason);
                    None
                }
            }
        } else {
            None
        };

        let report = build_report(ReportInput {
            batch: batch.as_ref(),
            upgrade: upgrade.as_ref(),
            decision,
            update_error: update_error.as_deref(),
            total_elapsed: clock.elapsed(),
            dry_run,
        });
        Ok(report)
    }

    async fn check_version(&self) -> Gate {
        if !self.cfg.upgrade.enabled {
            info!("upgrade disabled; skipping version check");
            return Gate::NotRequested;
        }

        let comparator = VersionComparator::new(
            GitClient::new(Arc::clone(&self.query_runner)),
            Arc::clone(&self.fs),
        );
        let remote = RemoteRef {
            url: self.cfg.repository.url.clone(),
            branch: self.cfg.repository.branch.clone(),
        };

        match comparator.compare(&self.cfg.app_path(), &remote).await {
            Ok(info) => Gate::Checked(info),
            Err(e) => {
                error!(error = %e, "version check failed; update path aborted");
                Gate::Unavailable(e.to_string())
            }
        }
    }

    async fn run_stages(&self, planner: &Planner<'_>, fetch: bool) -> Option<BatchOutcome> {
        let dry_run = self.cfg.dry_run();
        let mut stages = Vec::new();
        let mut pre_failed = Vec::new();

        if self.cfg.backup.enabled {
            stages.push(planner.backup_stage());
        }

        if self.cfg.database.enabled {
            let started_at = Utc::now();
            match resolve_credentials(
                self.fs.as_ref(),
                &self.cfg.database,
                &self.cfg.app_config_path(),
            ) {
                Ok(creds) => {
                    stages.push(planner.dump_stage(&creds, Arc::clone(&self.fs), !dry_run));
                }
                Err(e) => {
                    error!(error = %e, "cannot determine database credentials");
                    pre_failed.push(StageResult::new(
                        StageKind::DbDump,
                        "db-dump",
                        started_at,
                        Utc::now(),
                        std::time::Duration::ZERO,
                        StageOutcome::failure(e.to_string()),
                        Vec::new(),
                    ));
                }
            }
        }

        if fetch {
            let carry = self.fs.exists(&self.cfg.app_config_path());
            if !carry {
                warn!(
                    path = %self.cfg.app_config_path().display(),
                    "no application config to carry into the new checkout"
                );
            }
            stages.push(planner.fetch_stage(carry));
        }

        if stages.is_empty() && pre_failed.is_empty() {
            return None;
        }

        let ctx = StageContext::new(Arc::clone(&self.action_runner), Arc::clone(&self.fs), dry_run);
        let mut batch = TaskCoordinator::new(ctx).run_concurrent(stages).await;
        batch.results.extend(pre_failed);
        Some(batch)
    }

    /// Why the upgrade must not start, if it must not.
    fn upgrade_gate(
        &self,
        planner: &Planner<'_>,
        batch: &Option<BatchOutcome>,
    ) -> std::result::Result<(), String> {
        if let Some(batch) = batch {
            let failed: Vec<_> = batch.failures().map(|r| r.label().to_string()).collect();
            if !failed.is_empty() {
                let staging = planner.paths().staging_dir;
                if self.fs.exists(&staging) {
                    info!(path = %staging.display(), "staged checkout left in place");
                }
                return Err(format!("prior stages failed: {}", failed.join(", ")));
            }
        }

        let live = detect_release(self.fs.as_ref(), &self.cfg.app_path());
        let staged = detect_release(self.fs.as_ref(), &planner.paths().staging_dir);
        if let (Some(live), Some(staged)) = (live, staged) {
            info!(installed = %live, fetched = %staged, "release change");
            if staged.compare_build(&live) == Some(std::cmp::Ordering::Less) {
                return Err(format!(
                    "fetched release {staged} is older than installed {live}"
                ));
            }
        }
        Ok(())
    }

    async fn run_upgrade(&self, planner: &Planner<'_>) -> Result<SequencerOutcome> {
        let plan = planner.upgrade_plan(true)?;
        let sequencer = UpgradeSequencer::new(
            Arc::clone(&self.action_runner),
            Arc::clone(&self.fs),
            self.cfg.dry_run(),
        );
        Ok(sequencer.run(&plan).await)
    }
}
