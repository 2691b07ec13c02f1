// src/report/mod.rs

//! Report Builder: pure aggregation of stage results into a run summary.

mod render;

use std::time::Duration;

pub use render::log_report;

use crate::coordinator::BatchOutcome;
use crate::sequencer::{SequencerOutcome, UpgradeState};
use crate::stage::StageResult;
use crate::version::UpdateDecision;

/// Authoritative end-of-run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Nothing to upgrade; any requested backups succeeded.
    UpToDate,
    /// Update not attempted on purpose (e.g. local changes); backups fine.
    UpdateSkipped,
    /// Some stages succeeded, some failed.
    PartialFailure,
    Failed,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::PartialFailure | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::UpToDate => "up to date",
            RunStatus::UpdateSkipped => "update skipped",
            RunStatus::PartialFailure => "partial failure",
            RunStatus::Failed => "failed",
        }
    }
}

/// Everything the builder aggregates. All fields are optional because a
/// run may stop before the coordinator or the sequencer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportInput<'a> {
    pub batch: Option<&'a BatchOutcome>,
    pub upgrade: Option<&'a SequencerOutcome>,
    pub decision: Option<UpdateDecision>,
    /// Why the update path was abandoned before the sequencer, if it was.
    pub update_error: Option<&'a str>,
    pub total_elapsed: Duration,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    /// Concurrent stages first, then the upgrade stage if it ran.
    pub stages: Vec<StageResult>,
    pub decision: Option<UpdateDecision>,
    pub upgrade_state: Option<UpgradeState>,
    pub update_error: Option<String>,
    pub batch_duration: Option<Duration>,
    /// Sum of concurrent stage durations minus the batch duration. Only set
    /// when more than one stage ran concurrently.
    pub time_saved: Option<Duration>,
    pub total_elapsed: Duration,
    pub dry_run: bool,
}

impl RunReport {
    pub fn failed_stages(&self) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(|s| !s.succeeded())
    }

    pub fn warning_count(&self) -> usize {
        self.stages.iter().map(|s| s.warnings().len()).sum()
    }
}

/// Time saved by running `durations` concurrently in `batch`. Never
/// negative.
pub fn time_saved(durations: impl IntoIterator<Item = Duration>, batch: Duration) -> Duration {
    durations
        .into_iter()
        .sum::<Duration>()
        .saturating_sub(batch)
}

pub fn build_report(input: ReportInput<'_>) -> RunReport {
    let mut stages: Vec<StageResult> = input
        .batch
        .map(|b| b.results.clone())
        .unwrap_or_default();

    let (batch_duration, saved) = match input.batch {
        Some(batch) => {
            let saved = (batch.results.len() > 1).then(|| {
                time_saved(
                    batch.results.iter().map(StageResult::duration),
                    batch.batch_duration,
                )
            });
            (Some(batch.batch_duration), saved)
        }
        None => (None, None),
    };

    if let Some(upgrade) = input.upgrade {
        stages.push(upgrade.stage_result.clone());
    }

    let upgrade_state = input.upgrade.map(|u| u.final_state);
    let status = derive_status(&stages, upgrade_state, input.decision, input.update_error);

    RunReport {
        status,
        stages,
        decision: input.decision,
        upgrade_state,
        update_error: input.update_error.map(str::to_string),
        batch_duration,
        time_saved: saved,
        total_elapsed: input.total_elapsed,
        dry_run: input.dry_run,
    }
}

fn derive_status(
    stages: &[StageResult],
    upgrade_state: Option<UpgradeState>,
    decision: Option<UpdateDecision>,
    update_error: Option<&str>,
) -> RunStatus {
    if upgrade_state == Some(UpgradeState::Failed) {
        return RunStatus::Failed;
    }

    let failed = stages.iter().filter(|s| !s.succeeded()).count();
    let succeeded = stages.len() - failed;
    if failed > 0 || update_error.is_some() {
        return if succeeded > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Failed
        };
    }

    match decision {
        Some(UpdateDecision::AlreadyUpToDate) => RunStatus::UpToDate,
        Some(UpdateDecision::DirtyWorkingTree) => RunStatus::UpdateSkipped,
        _ => RunStatus::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{StageKind, StageOutcome};
    use chrono::Utc;

    fn stage(kind: StageKind, secs: u64, ok: bool) -> StageResult {
        let outcome = if ok {
            StageOutcome::Success
        } else {
            StageOutcome::failure(format!("{kind} exited with code 1"))
        };
        StageResult::new(
            kind,
            kind.as_str(),
            Utc::now(),
            Utc::now(),
            Duration::from_secs(secs),
            outcome,
            Vec::new(),
        )
    }

    fn batch(results: Vec<StageResult>, secs: u64) -> BatchOutcome {
        BatchOutcome {
            results,
            started_at: Utc::now(),
            batch_duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn computes_time_saved_for_concurrent_stages() {
        let b = batch(
            vec![
                stage(StageKind::Backup, 30, true),
                stage(StageKind::DbDump, 20, true),
                stage(StageKind::Fetch, 10, true),
            ],
            31,
        );
        let report = build_report(ReportInput {
            batch: Some(&b),
            decision: Some(UpdateDecision::Applicable),
            total_elapsed: Duration::from_secs(40),
            ..Default::default()
        });
        assert_eq!(report.time_saved, Some(Duration::from_secs(29)));
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn single_stage_has_no_time_saved() {
        let b = batch(vec![stage(StageKind::Backup, 30, true)], 30);
        let report = build_report(ReportInput {
            batch: Some(&b),
            ..Default::default()
        });
        assert_eq!(report.time_saved, None);
    }

    #[test]
    fn dump_failure_with_good_backup_is_partial() {
        let b = batch(
            vec![
                stage(StageKind::Backup, 5, true),
                stage(StageKind::DbDump, 1, false),
            ],
            5,
        );
        let report = build_report(ReportInput {
            batch: Some(&b),
            decision: Some(UpdateDecision::Applicable),
            ..Default::default()
        });
        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(report.failed_stages().count(), 1);
        assert!(report.status.is_failure());
    }

    #[test]
    fn up_to_date_and_skipped_are_not_failures() {
        let b = batch(vec![stage(StageKind::Backup, 5, true)], 5);
        let up_to_date = build_report(ReportInput {
            batch: Some(&b),
            decision: Some(UpdateDecision::AlreadyUpToDate),
            ..Default::default()
        });
        assert_eq!(up_to_date.status, RunStatus::UpToDate);

        let dirty = build_report(ReportInput {
            decision: Some(UpdateDecision::DirtyWorkingTree),
            ..Default::default()
        });
        assert_eq!(dirty.status, RunStatus::UpdateSkipped);
        assert!(!dirty.status.is_failure());
    }

    #[test]
    fn unreachable_remote_after_good_backup_is_partial() {
        let b = batch(vec![stage(StageKind::Backup, 5, true)], 5);
        let report = build_report(ReportInput {
            batch: Some(&b),
            update_error: Some("remote repository unreachable"),
            ..Default::default()
        });
        assert_eq!(report.status, RunStatus::PartialFailure);

        let nothing_ran = build_report(ReportInput {
            update_error: Some("remote repository unreachable"),
            ..Default::default()
        });
        assert_eq!(nothing_ran.status, RunStatus::Failed);
    }

    #[test]
    fn time_saved_saturates() {
        let saved = time_saved([Duration::from_secs(1)], Duration::from_secs(3));
        assert_eq!(saved, Duration::ZERO);
    }
}
