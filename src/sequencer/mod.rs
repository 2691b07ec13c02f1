// src/sequencer/mod.rs

//! Upgrade Sequencer.
//!
//! Brackets the application's upgrade command with health checks,
//! maintenance mode and service stop/start:
//!
//! `Idle → PreCheck → [MaintenanceOn] → [ServiceStop] → Upgrade → PostCheck
//!  → [ServiceStart] → [MaintenanceOff] → Done`
//!
//! Any failure moves to `Failed`; maintenance mode is still disabled and
//! stopped services are still started on that path. Nothing in here runs
//! concurrently, and a failed upgrade is never retried.

pub mod activation;
pub mod health;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

pub use activation::Activation;
pub use health::{classify, HealthReport, HealthStatus};
pub use state::{Transition, UpgradeMachine, UpgradeState};

use crate::errors::{Result, UpdaterError};
use crate::exec::{CommandSpec, ExitOutcome, ProcessOutput, ProcessRunner};
use crate::fs::FileSystem;
use crate::stage::{StageKind, StageOutcome, StageResult};

/// Commands to stop and start one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommands {
    pub name: String,
    pub stop: CommandSpec,
    pub start: CommandSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceCommands {
    pub enable: CommandSpec,
    pub disable: CommandSpec,
}

/// Everything the sequencer needs to run, prepared by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    /// Swap in a staged checkout right before the upgrade command.
    pub activation: Option<Activation>,
    pub health_check: Option<CommandSpec>,
    pub maintenance: Option<MaintenanceCommands>,
    pub services: Vec<ServiceCommands>,
    pub upgrade: CommandSpec,
    pub block_on_failed_precheck: bool,
    pub block_on_failed_postcheck: bool,
}

impl UpgradePlan {
    pub fn new(upgrade: CommandSpec) -> Self {
        Self {
            activation: None,
            health_check: None,
            maintenance: None,
            services: Vec::new(),
            upgrade,
            block_on_failed_precheck: false,
            block_on_failed_postcheck: false,
        }
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub state: UpgradeState,
    pub command: String,
    pub succeeded: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencerOutcome {
    pub final_state: UpgradeState,
    /// State in which the run failed, if it did.
    pub failed_in: Option<UpgradeState>,
    pub error: Option<String>,
    pub transitions: Vec<Transition>,
    pub steps: Vec<StepRecord>,
    pub pre_check: Option<HealthReport>,
    pub post_check: Option<HealthReport>,
    /// The whole sequence as a stage, for the report.
    pub stage_result: StageResult,
}

impl SequencerOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_state == UpgradeState::Done
    }

    /// Number of executed steps for `state`.
    pub fn steps_in(&self, state: UpgradeState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }
}

pub struct UpgradeSequencer {
    runner: Arc<dyn ProcessRunner>,
    fs: Arc<dyn FileSystem>,
    dry_run: bool,
}

/// Mutable bookkeeping for a single run.
struct Run {
    machine: UpgradeMachine,
    steps: Vec<StepRecord>,
    maintenance_enabled: bool,
    stopped: Vec<usize>,
    pre_check: Option<HealthReport>,
    post_check: Option<HealthReport>,
}

impl UpgradeSequencer {
    pub fn new(runner: Arc<dyn ProcessRunner>, fs: Arc<dyn FileSystem>, dry_run: bool) -> Self {
        Self {
            runner,
            fs,
            dry_run,
        }
    }

    pub async fn run(&self, plan: &UpgradePlan) -> SequencerOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut run = Run {
            machine: UpgradeMachine::new(),
            steps: Vec::new(),
            maintenance_enabled: false,
            stopped: Vec::new(),
            pre_check: None,
            post_check: None,
        };

        info!(command = %plan.upgrade, "upgrade sequence started");

        let mut error = match self.forward(plan, &mut run).await {
            Ok(()) => None,
            Err(e) => {
                error!(state = %run.machine.current(), error = %e, "upgrade sequence failed");
                self.fail(&mut run);
                Some(e.to_string())
            }
        };

        if let Err(e) = self.cleanup(plan, &mut run).await {
            error!(error = %e, "cleanup after upgrade failed");
            if error.is_none() {
                self.fail(&mut run);
                error = Some(e.to_string());
            }
        }

        if run.machine.current() != UpgradeState::Failed {
            if let Err(e) = self.enter(&mut run, UpgradeState::Done) {
                error = Some(e.to_string());
                self.fail(&mut run);
            }
        }

        let final_state = run.machine.current();
        let outcome = match error {
            None => StageOutcome::Success,
            Some(ref e) => StageOutcome::failure(e.clone()),
        };
        let stage_result = StageResult::new(
            StageKind::Upgrade,
            "upgrade",
            started_at,
            Utc::now(),
            clock.elapsed(),
            outcome,
            Vec::new(),
        );

        match final_state {
            UpgradeState::Done => info!(elapsed_ms = clock.elapsed().as_millis() as u64, "upgrade sequence done"),
            state => warn!(final_state = %state, failed_in = ?run.machine.failed_in(), "upgrade sequence ended"),
        }

        SequencerOutcome {
            final_state,
            failed_in: run.machine.failed_in(),
            error,
            steps: run.steps,
            pre_check: run.pre_check,
            post_check: run.post_check,
            transitions: run.machine.into_history(),
            stage_result,
        }
    }

    async fn forward(&self, plan: &UpgradePlan, run: &mut Run) -> Result<()> {
        self.enter(run, UpgradeState::PreCheck)?;
        if let Some(ref check) = plan.health_check {
            let report = self.health_check(run, check).await;
            let passed = report.passed();
            run.pre_check = Some(report);
            if !passed {
                if plan.block_on_failed_precheck {
                    return Err(UpdaterError::UpgradeFailed(
                        "pre-upgrade health check failed".to_string(),
                    ));
                }
                warn!("pre-upgrade health check reported problems; continuing");
            }
        } else {
            info!("no health check configured");
        }

        if let Some(ref maintenance) = plan.maintenance {
            self.enter(run, UpgradeState::MaintenanceOn)?;
            run.maintenance_enabled = true;
            self.step(run, UpgradeState::MaintenanceOn, &maintenance.enable)
                .await?;
        }

        if !plan.services.is_empty() {
            self.enter(run, UpgradeState::ServiceStop)?;
            for (idx, service) in plan.services.iter().enumerate() {
                run.stopped.push(idx);
                info!(service = %service.name, "stopping service");
                self.step(run, UpgradeState::ServiceStop, &service.stop).await?;
            }
        }

        self.enter(run, UpgradeState::Upgrade)?;
        if let Some(ref activation) = plan.activation {
            activation.apply(self.fs.as_ref(), self.dry_run)?;
        }
        self.step(run, UpgradeState::Upgrade, &plan.upgrade)
            .await
            .map_err(|e| match e {
                UpdaterError::UpgradeFailed(_) => e,
                other => UpdaterError::UpgradeFailed(other.to_string()),
            })?;

        self.enter(run, UpgradeState::PostCheck)?;
        if let Some(ref check) = plan.health_check {
            let report = self.health_check(run, check).await;
            if let Some(ref pre) = run.pre_check {
                health::log_comparison(pre, &report);
            }
            let passed = report.passed();
            run.post_check = Some(report);
            if !passed {
                if plan.block_on_failed_postcheck {
                    return Err(UpdaterError::UpgradeFailed(
                        "post-upgrade health check failed".to_string(),
                    ));
                }
                warn!("post-upgrade health check reported problems");
            }
        }

        Ok(())
    }

    /// Start every service whose stop was attempted and disable maintenance
    /// mode if enabling it was attempted. Each runs once, on every path; the
    /// first error is returned after all of them ran.
    async fn cleanup(&self, plan: &UpgradePlan, run: &mut Run) -> Result<()> {
        let mut first_err = None;

        if !run.stopped.is_empty() {
            if let Err(e) = self.enter_cleanup(run, UpgradeState::ServiceStart) {
                first_err.get_or_insert(e);
            }
            let stopped = std::mem::take(&mut run.stopped);
            for idx in stopped.into_iter().rev() {
                let service = &plan.services[idx];
                info!(service = %service.name, "starting service");
                if let Err(e) = self.step(run, UpgradeState::ServiceStart, &service.start).await {
                    first_err.get_or_insert(e);
                }
            }
        }

        if let Some(maintenance) = plan.maintenance.as_ref().filter(|_| run.maintenance_enabled) {
            if let Err(e) = self.enter_cleanup(run, UpgradeState::MaintenanceOff) {
                first_err.get_or_insert(e);
            }
            run.maintenance_enabled = false;
            if let Err(e) = self
                .step(run, UpgradeState::MaintenanceOff, &maintenance.disable)
                .await
            {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn enter(&self, run: &mut Run, state: UpgradeState) -> Result<()> {
        let from = run.machine.current();
        run.machine.advance(state)?;
        info!(%from, to = %state, "upgrade state transition");
        Ok(())
    }

    /// Cleanup states are entered even if the bookkeeping rejects them;
    /// the commands behind them must run regardless.
    fn enter_cleanup(&self, run: &mut Run, state: UpgradeState) -> Result<()> {
        let from = run.machine.current();
        run.machine.enter_cleanup(state)?;
        info!(%from, to = %state, "upgrade state transition");
        Ok(())
    }

    fn fail(&self, run: &mut Run) {
        let from = run.machine.current();
        if run.machine.fail().is_ok() {
            warn!(%from, to = %UpgradeState::Failed, "upgrade state transition");
        }
    }

    async fn exec(&self, cmd: &CommandSpec) -> Result<ProcessOutput> {
        self.runner.run(cmd).await
    }

    async fn step(&self, run: &mut Run, state: UpgradeState, cmd: &CommandSpec) -> Result<()> {
        let result = match self.exec(cmd).await {
            Ok(out) => {
                let elapsed_ms = out.duration.as_millis() as u64;
                let result = out.into_result(cmd);
                match result {
                    Ok(_) => info!(%state, command = %cmd, elapsed_ms, "step succeeded"),
                    Err(ref e) => error!(%state, command = %cmd, elapsed_ms, error = %e, "step failed"),
                }
                result.map(|_| ())
            }
            Err(e) => {
                error!(%state, command = %cmd, error = %e, "step could not run");
                Err(e)
            }
        };

        run.steps.push(StepRecord {
            state,
            command: cmd.to_string(),
            succeeded: result.is_ok(),
            detail: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// Run the health check. A check that cannot even be started counts as
    /// an error report rather than aborting the sequence.
    async fn health_check(&self, run: &mut Run, cmd: &CommandSpec) -> HealthReport {
        let state = run.machine.current();
        let report = match self.exec(cmd).await {
            Ok(out) => classify(&out),
            Err(e) => HealthReport {
                status: HealthStatus::Error,
                outcome: ExitOutcome::NonZeroExit(-1),
                findings: vec![e.to_string()],
            },
        };
        info!(
            %state,
            status = %report.status,
            outcome = %report.outcome,
            findings = report.findings.len(),
            "health check finished"
        );
        for finding in &report.findings {
            warn!(%state, "{finding}");
        }
        run.steps.push(StepRecord {
            state,
            command: cmd.to_string(),
            succeeded: report.passed(),
            detail: (!report.passed()).then(|| format!("health check: {}", report.status)),
        });
        report
    }
}
