// src/stage/result.rs

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::monitor::MonitorWarning;

/// Which unit of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Backup,
    DbDump,
    Fetch,
    Upgrade,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Backup => "backup",
            StageKind::DbDump => "db-dump",
            StageKind::Fetch => "fetch",
            StageKind::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a stage. A failure always carries a non-empty detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failure { error: String },
}

impl StageOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error
        };
        StageOutcome::Failure { error }
    }
}

/// Timing, outcome and warnings of one finished stage. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    kind: StageKind,
    label: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration: Duration,
    outcome: StageOutcome,
    warnings: Vec<MonitorWarning>,
}

impl StageResult {
    /// `finished_at` is clamped to `started_at` if the wall clock went
    /// backwards while the stage ran.
    pub fn new(
        kind: StageKind,
        label: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration: Duration,
        outcome: StageOutcome,
        warnings: Vec<MonitorWarning>,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            started_at,
            finished_at: finished_at.max(started_at),
            duration,
            outcome,
            warnings,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn outcome(&self) -> &StageOutcome {
        &self.outcome
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == StageOutcome::Success
    }

    pub fn error(&self) -> Option<&str> {
        match self.outcome {
            StageOutcome::Success => None,
            StageOutcome::Failure { ref error } => Some(error),
        }
    }

    pub fn warnings(&self) -> &[MonitorWarning] {
        &self.warnings
    }
}
