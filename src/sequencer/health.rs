// src/sequencer/health.rs

//! Classification of the application's health-check output.

use std::fmt;

use tracing::{info, warn};

use crate::exec::{ExitOutcome, ProcessOutput};

/// Worst status reported by a check run, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub outcome: ExitOutcome,
    /// Lines that mention a non-OK status.
    pub findings: Vec<String>,
}

impl HealthReport {
    /// A check "passes" when the command exited cleanly.
    pub fn passed(&self) -> bool {
        self.outcome == ExitOutcome::Success
    }
}

fn line_status(line: &str) -> Option<HealthStatus> {
    let upper = line.to_uppercase();
    if upper.contains("CRITICAL") || upper.contains("ERROR") {
        Some(HealthStatus::Error)
    } else if upper.contains("WARNING") {
        Some(HealthStatus::Warning)
    } else if upper.contains("OK") {
        Some(HealthStatus::Ok)
    } else {
        None
    }
}

/// Nagios-style exit codes: 0 ok, 1 warning, anything else error.
fn exit_status(outcome: ExitOutcome) -> HealthStatus {
    match outcome {
        ExitOutcome::Success => HealthStatus::Ok,
        ExitOutcome::NonZeroExit(1) => HealthStatus::Warning,
        _ => HealthStatus::Error,
    }
}

pub fn classify(output: &ProcessOutput) -> HealthReport {
    let mut status = exit_status(output.outcome);
    let mut findings = Vec::new();

    for line in output.stdout.lines().chain(output.stderr.lines()) {
        match line_status(line) {
            Some(HealthStatus::Ok) | None => {}
            Some(s) => {
                status = status.max(s);
                findings.push(line.trim().to_string());
            }
        }
    }

    HealthReport {
        status,
        outcome: output.outcome,
        findings,
    }
}

/// Log how the post-upgrade check differs from the pre-upgrade one.
pub fn log_comparison(pre: &HealthReport, post: &HealthReport) {
    if post.status > pre.status {
        warn!(before = %pre.status, after = %post.status, "health degraded after upgrade");
        for finding in post.findings.iter().filter(|f| !pre.findings.contains(f)) {
            warn!("new finding: {finding}");
        }
    } else if post.status < pre.status {
        info!(before = %pre.status, after = %post.status, "health improved after upgrade");
    } else {
        info!(status = %post.status, "health unchanged after upgrade");
    }
}
