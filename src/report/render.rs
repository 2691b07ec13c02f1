// src/report/render.rs

//! Text rendering of a [`RunReport`].

use std::fmt;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{RunReport, RunStatus};

fn human(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "DRY RUN: no changes were made")?;
        }
        writeln!(f, "Run status: {}", self.status)?;
        if let Some(decision) = self.decision {
            writeln!(f, "Update check: {decision}")?;
        }
        if let Some(ref err) = self.update_error {
            writeln!(f, "Update aborted: {err}")?;
        }
        if let Some(state) = self.upgrade_state {
            writeln!(f, "Upgrade final state: {state}")?;
        }

        for stage in &self.stages {
            let status = if stage.succeeded() { "ok" } else { "FAILED" };
            writeln!(
                f,
                "  {:<10} {:>10}  {}",
                stage.label(),
                human(stage.duration()),
                status
            )?;
            if let Some(err) = stage.error() {
                writeln!(f, "      error: {err}")?;
            }
            for warning in stage.warnings() {
                writeln!(f, "      warning: {warning}")?;
            }
        }

        if let Some(batch) = self.batch_duration {
            writeln!(f, "Concurrent stages took {}", human(batch))?;
        }
        if let Some(saved) = self.time_saved {
            writeln!(f, "Time saved by running stages concurrently: {}", human(saved))?;
        }
        write!(f, "Total elapsed: {}", human(self.total_elapsed))
    }
}

/// Emit the report through `tracing`, one event per line.
pub fn log_report(report: &RunReport) {
    let text = report.to_string();
    for line in text.lines() {
        match report.status {
            RunStatus::Failed => error!("{line}"),
            RunStatus::PartialFailure | RunStatus::UpdateSkipped => warn!("{line}"),
            RunStatus::Success | RunStatus::UpToDate => info!("{line}"),
        }
    }
}
