// src/lib.rs

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod monitor;
pub mod report;
pub mod sequencer;
pub mod stage;
pub mod types;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::engine::Orchestrator;
use crate::exec::TokioProcessRunner;
use crate::fs::RealFileSystem;
use crate::report::{log_report, RunStatus};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, applies CLI overrides, runs one update
/// cycle with the real process runner and filesystem, and logs the report.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?
        .apply_overrides(args.overrides())?;

    info!(
        config = %config_path.display(),
        dry_run = cfg.dry_run(),
        backup = cfg.backup.enabled,
        dump = cfg.database.enabled,
        upgrade = cfg.upgrade.enabled,
        "configuration loaded"
    );

    let orchestrator = Orchestrator::new(
        cfg,
        Arc::new(TokioProcessRunner::new()),
        Arc::new(RealFileSystem),
    );
    let report = orchestrator.run().await?;
    log_report(&report);
    Ok(report.status)
}
