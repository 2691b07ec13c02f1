// src/stage/runner.rs

//! Runs one stage: starts its monitors, executes its steps in order, stops
//! the monitors and folds everything into a [`StageResult`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::{Result, UpdaterError};
use crate::exec::ProcessRunner;
use crate::fs::FileSystem;
use crate::monitor::MonitorHandle;
use crate::stage::result::{StageOutcome, StageResult};
use crate::stage::spec::{StageSpec, StageStep};

/// Shared collaborators for stage execution.
#[derive(Clone)]
pub struct StageContext {
    /// Action runner; already a dry-run runner when `dry_run` is set.
    pub runner: Arc<dyn ProcessRunner>,
    pub fs: Arc<dyn FileSystem>,
    pub dry_run: bool,
}

impl StageContext {
    pub fn new(runner: Arc<dyn ProcessRunner>, fs: Arc<dyn FileSystem>, dry_run: bool) -> Self {
        Self {
            runner,
            fs,
            dry_run,
        }
    }
}

/// Execute `spec` to completion. Never returns an error: failures are
/// recorded in the result.
pub async fn run_stage(spec: StageSpec, ctx: &StageContext) -> StageResult {
    let StageSpec {
        kind,
        label,
        steps,
        monitors,
    } = spec;

    info!(stage = %label, steps = steps.len(), "stage started");
    let started_at = Utc::now();
    let clock = Instant::now();

    let mut handles: Vec<MonitorHandle> = monitors.into_iter().map(|m| m.start()).collect();

    let mut outcome = StageOutcome::Success;
    for (idx, step) in steps.iter().enumerate() {
        if let Err(e) = run_step(step, ctx).await {
            error!(stage = %label, index = idx + 1, %step, error = %e, "stage step failed");
            outcome = StageOutcome::failure(e.to_string());
            break;
        }
    }

    let mut warnings = Vec::new();
    for handle in handles.iter_mut() {
        warnings.extend(handle.stop().await);
    }

    let duration = clock.elapsed();
    let result = StageResult::new(
        kind,
        label,
        started_at,
        Utc::now(),
        duration,
        outcome,
        warnings,
    );

    match result.error() {
        None => info!(
            stage = %result.label(),
            elapsed_ms = duration.as_millis() as u64,
            warnings = result.warnings().len(),
            "stage succeeded"
        ),
        Some(err) => warn!(
            stage = %result.label(),
            elapsed_ms = duration.as_millis() as u64,
            error = %err,
            "stage failed"
        ),
    }
    result
}

async fn run_step(step: &StageStep, ctx: &StageContext) -> Result<()> {
    match step {
        StageStep::Run(cmd) => {
            ctx.runner.run(cmd).await?.into_result(cmd)?;
        }
        StageStep::CreateDir(dir) if ctx.dry_run => {
            info!(dir = %dir.display(), "[dry-run] would create directory");
        }
        StageStep::CreateDir(dir) => {
            ctx.fs.create_dir_all(dir).map_err(UpdaterError::from)?;
        }
        StageStep::CopyFile { from, to } if ctx.dry_run => {
            info!(from = %from.display(), to = %to.display(), "[dry-run] would copy file");
        }
        StageStep::CopyFile { from, to } => {
            ctx.fs.copy_file(from, to)?;
        }
    }
    Ok(())
}
