// src/stage/spec.rs

use std::fmt;
use std::path::PathBuf;

use crate::exec::CommandSpec;
use crate::monitor::StageMonitor;
use crate::stage::result::StageKind;

/// One sequential step inside a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStep {
    Run(CommandSpec),
    CreateDir(PathBuf),
    CopyFile { from: PathBuf, to: PathBuf },
}

impl fmt::Display for StageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStep::Run(cmd) => write!(f, "{cmd}"),
            StageStep::CreateDir(dir) => write!(f, "mkdir -p {}", dir.display()),
            StageStep::CopyFile { from, to } => {
                write!(f, "copy {} -> {}", from.display(), to.display())
            }
        }
    }
}

/// A unit of work for the coordinator: internally sequential steps plus the
/// monitors that run alongside them.
#[derive(Debug)]
pub struct StageSpec {
    pub kind: StageKind,
    pub label: String,
    pub steps: Vec<StageStep>,
    pub monitors: Vec<StageMonitor>,
}

impl StageSpec {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            label: kind.to_string(),
            steps: Vec::new(),
            monitors: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn step(mut self, step: StageStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn run(self, cmd: CommandSpec) -> Self {
        self.step(StageStep::Run(cmd))
    }

    pub fn monitor(mut self, monitor: StageMonitor) -> Self {
        self.monitors.push(monitor);
        self
    }

    /// Commands this stage would run, in order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.steps.iter().filter_map(|s| match s {
            StageStep::Run(cmd) => Some(cmd),
            _ => None,
        })
    }
}
