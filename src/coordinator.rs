// src/coordinator.rs

//! Concurrent execution of independent stages.
//!
//! Each stage gets its own Tokio task. The coordinator waits for every
//! stage to reach a terminal state; one stage failing never cancels its
//! siblings, since a good file backup is worth keeping even if the dump
//! failed. Callers must give concurrently-run stages disjoint output paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::stage::{run_stage, StageContext, StageOutcome, StageResult, StageSpec};

/// Results of one concurrent batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// In the order the stages were submitted.
    pub results: Vec<StageResult>,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time of the whole batch.
    pub batch_duration: Duration,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(StageResult::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }

    /// Sum of the individual stage durations.
    pub fn sequential_duration(&self) -> Duration {
        self.results.iter().map(StageResult::duration).sum()
    }
}

pub struct TaskCoordinator {
    ctx: Arc<StageContext>,
}

impl TaskCoordinator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Run all stages in parallel and wait for every one of them.
    pub async fn run_concurrent(&self, stages: Vec<StageSpec>) -> BatchOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();

        let labels: Vec<_> = stages.iter().map(|s| s.label.as_str()).collect();
        info!(stages = ?labels, "starting concurrent stages");

        let handles: Vec<_> = stages
            .into_iter()
            .map(|spec| {
                let kind = spec.kind;
                let label = spec.label.clone();
                let ctx = Arc::clone(&self.ctx);
                let handle = tokio::spawn(async move { run_stage(spec, &ctx).await });
                (kind, label, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (kind, label, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(stage = %label, error = %e, "stage task aborted");
                    StageResult::new(
                        kind,
                        label,
                        started_at,
                        Utc::now(),
                        clock.elapsed(),
                        StageOutcome::failure(format!("stage task aborted: {e}")),
                        Vec::new(),
                    )
                }
            };
            results.push(result);
        }

        let batch_duration = clock.elapsed();
        info!(
            stages = results.len(),
            failed = results.iter().filter(|r| !r.succeeded()).count(),
            elapsed_ms = batch_duration.as_millis() as u64,
            "concurrent stages finished"
        );

        BatchOutcome {
            results,
            started_at,
            batch_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::DryRunRunner;
    use crate::fs::{FileSystem, MockFileSystem};
    use crate::stage::{StageKind, StageStep};

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let fs = MockFileSystem::new();
        let coordinator = TaskCoordinator::new(StageContext::new(
            Arc::new(DryRunRunner),
            Arc::new(fs.clone()),
            false,
        ));

        let failing = StageSpec::new(StageKind::DbDump).step(StageStep::CopyFile {
            from: "/missing".into(),
            to: "/backups/x".into(),
        });
        let ok = StageSpec::new(StageKind::Backup).step(StageStep::CreateDir("/backups/files".into()));

        let batch = coordinator.run_concurrent(vec![failing, ok]).await;

        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].kind(), StageKind::DbDump);
        assert!(!batch.results[0].succeeded());
        assert!(batch.results[1].succeeded());
        assert!(!batch.all_succeeded());
        assert_eq!(batch.failures().count(), 1);
        assert!(fs.is_dir(std::path::Path::new("/backups/files")));
    }

    #[tokio::test]
    async fn empty_batch_is_trivially_successful() {
        let coordinator = TaskCoordinator::new(StageContext::new(
            Arc::new(DryRunRunner),
            Arc::new(MockFileSystem::new()),
            true,
        ));
        let batch = coordinator.run_concurrent(Vec::new()).await;
        assert!(batch.results.is_empty());
        assert!(batch.all_succeeded());
    }
}
