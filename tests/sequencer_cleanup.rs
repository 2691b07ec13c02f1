mod common;

use std::sync::Arc;

use appupdater::config::ConfigFile;
use appupdater::engine::Planner;
use appupdater::fs::MockFileSystem;
use appupdater::sequencer::{HealthStatus, SequencerOutcome, UpgradeSequencer, UpgradeState};

use common::*;

use UpgradeState::*;

const UPGRADE: &[&str] = &["admin/cli/upgrade.php"];
const CHECKS: &[&str] = &["admin/cli/checks.php"];
const ENABLE: &[&str] = &["admin/cli/maintenance.php", "--enable"];
const DISABLE: &[&str] = &["admin/cli/maintenance.php", "--disable"];

async fn run_sequence(
    cfg: &ConfigFile,
    runner: &FakeRunner,
) -> Result<SequencerOutcome, Box<dyn std::error::Error>> {
    let plan = Planner::new(cfg, "2025-02-14-03-00-00").upgrade_plan(false)?;
    let sequencer = UpgradeSequencer::new(
        Arc::new(runner.clone()),
        Arc::new(MockFileSystem::new()),
        false,
    );
    Ok(with_timeout(sequencer.run(&plan)).await)
}

fn states(outcome: &SequencerOutcome) -> Vec<(UpgradeState, UpgradeState)> {
    outcome.transitions.iter().map(|t| (t.from, t.to)).collect()
}

#[tokio::test]
async fn happy_path_visits_every_configured_state_in_order() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    let cfg = ConfigFileBuilder::new().services(&["apache2"]).build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert!(outcome.succeeded());
    assert_eq!(
        states(&outcome),
        vec![
            (Idle, PreCheck),
            (PreCheck, MaintenanceOn),
            (MaintenanceOn, ServiceStop),
            (ServiceStop, Upgrade),
            (Upgrade, PostCheck),
            (PostCheck, ServiceStart),
            (ServiceStart, MaintenanceOff),
            (MaintenanceOff, Done),
        ]
    );
    assert_eq!(runner.count(CHECKS), 2);
    assert!(outcome.stage_result.succeeded());
    Ok(())
}

#[tokio::test]
async fn failed_upgrade_restores_services_and_maintenance_once() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(UPGRADE, Response::exit(1, "Database error: table missing"));
    let cfg = ConfigFileBuilder::new()
        .services(&["apache2", "cron"])
        .build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.final_state, Failed);
    assert_eq!(outcome.failed_in, Some(Upgrade));
    assert!(outcome.error.as_deref().unwrap_or_default().contains("table missing"));
    assert!(!outcome.stage_result.succeeded());
    assert!(outcome.post_check.is_none());

    assert_eq!(outcome.steps_in(MaintenanceOff), 1);
    assert_eq!(outcome.steps_in(ServiceStart), 2);
    assert_eq!(runner.count(DISABLE), 1);
    assert_eq!(runner.count(&["start", "apache2"]), 1);
    assert_eq!(runner.count(&["start", "cron"]), 1);

    // Services come back in reverse order, maintenance goes off last.
    let calls = runner.rendered();
    let cron = calls.iter().position(|c| c.ends_with("start cron"));
    let apache = calls.iter().position(|c| c.ends_with("start apache2"));
    let disable = calls.iter().position(|c| c.ends_with("--disable"));
    assert!(cron < apache && apache < disable);

    let cleanup: Vec<_> = states(&outcome)
        .into_iter()
        .filter(|(from, _)| *from == Failed)
        .collect();
    assert_eq!(cleanup, vec![(Failed, ServiceStart), (Failed, MaintenanceOff)]);
    Ok(())
}

#[tokio::test]
async fn upgrade_that_cannot_start_still_cleans_up() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(UPGRADE, Response::SpawnError("php: not found".to_string()));
    let cfg = ConfigFileBuilder::new().build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.failed_in, Some(Upgrade));
    assert!(outcome.error.as_deref().unwrap_or_default().contains("failed to spawn"));
    assert_eq!(runner.count(DISABLE), 1);
    Ok(())
}

#[tokio::test]
async fn failed_maintenance_enable_is_still_reverted() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(ENABLE, Response::exit(1, "cannot write maintenance flag"));
    let cfg = ConfigFileBuilder::new().services(&["apache2"]).build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.failed_in, Some(MaintenanceOn));
    assert_eq!(runner.count(UPGRADE), 0);
    assert_eq!(runner.count(&["stop", "apache2"]), 0);
    assert_eq!(runner.count(&["start", "apache2"]), 0);
    assert_eq!(runner.count(DISABLE), 1);
    Ok(())
}

#[tokio::test]
async fn failed_stop_restarts_every_attempted_service() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(&["stop", "cron"], Response::timed_out());
    let cfg = ConfigFileBuilder::new()
        .services(&["apache2", "cron", "php-fpm"])
        .build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.failed_in, Some(ServiceStop));
    assert_eq!(runner.count(&["stop", "php-fpm"]), 0);
    assert_eq!(runner.count(&["start", "cron"]), 1);
    assert_eq!(runner.count(&["start", "apache2"]), 1);
    assert_eq!(runner.count(&["start", "php-fpm"]), 0);
    assert_eq!(runner.count(UPGRADE), 0);
    assert_eq!(runner.count(DISABLE), 1);
    Ok(())
}

#[tokio::test]
async fn blocking_precheck_stops_before_maintenance() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.on(
        |cmd| cmd.mentions("admin/cli/checks.php"),
        Response::Output(appupdater::exec::ProcessOutput {
            outcome: appupdater::exec::ExitOutcome::NonZeroExit(2),
            stdout: "CRITICAL: database schema mismatch\n".to_string(),
            stderr: String::new(),
            duration: std::time::Duration::ZERO,
        }),
    );
    let cfg = ConfigFileBuilder::new()
        .block_on_failed_precheck(true)
        .build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.failed_in, Some(PreCheck));
    let pre = outcome.pre_check.as_ref().ok_or("no pre-check report")?;
    assert_eq!(pre.status, HealthStatus::Error);
    assert_eq!(runner.count(ENABLE), 0);
    assert_eq!(runner.count(DISABLE), 0);
    assert_eq!(runner.count(UPGRADE), 0);
    Ok(())
}

#[tokio::test]
async fn non_blocking_precheck_only_warns() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(CHECKS, Response::exit(1, ""));
    let cfg = ConfigFileBuilder::new().build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert!(outcome.succeeded());
    let pre = outcome.pre_check.as_ref().ok_or("no pre-check report")?;
    assert!(!pre.passed());
    assert_eq!(pre.status, HealthStatus::Warning);
    assert_eq!(runner.count(UPGRADE), 1);
    Ok(())
}

#[tokio::test]
async fn failing_cleanup_marks_the_run_failed() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(DISABLE, Response::exit(1, "config.php not writable"));
    let cfg = ConfigFileBuilder::new().build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.final_state, Failed);
    assert_eq!(outcome.failed_in, Some(MaintenanceOff));
    assert_eq!(runner.count(UPGRADE), 1);
    assert_eq!(runner.count(DISABLE), 1);
    Ok(())
}

#[tokio::test]
async fn blocking_postcheck_fails_after_restoring_services() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    runner.when(CHECKS, Response::exit(2, "CRITICAL: plugin versions mismatch"));
    let cfg = ConfigFileBuilder::new()
        .services(&["apache2"])
        .block_on_failed_precheck(false)
        .block_on_failed_postcheck(true)
        .build();

    let outcome = run_sequence(&cfg, &runner).await?;

    assert_eq!(outcome.final_state, Failed);
    assert_eq!(outcome.failed_in, Some(PostCheck));
    assert!(
        outcome
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("post-upgrade health check failed")
    );
    let post = outcome.post_check.as_ref().ok_or("no post-check report")?;
    assert!(!post.passed());
    assert_eq!(runner.count(CHECKS), 2);
    assert_eq!(runner.count(UPGRADE), 1);
    assert_eq!(runner.count(&["start", "apache2"]), 1);
    assert_eq!(runner.count(DISABLE), 1);
    Ok(())
}
