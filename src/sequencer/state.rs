// src/sequencer/state.rs

//! Upgrade state machine.
//!
//! Forward transitions are strictly ordered; optional states may be skipped
//! but never revisited. `Failed` is reachable from any non-terminal state.
//! Once failed, only the cleanup states (`ServiceStart`, `MaintenanceOff`)
//! may still run, each at most once, and the machine stays `Failed`.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::errors::{Result, UpdaterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradeState {
    Idle,
    PreCheck,
    MaintenanceOn,
    ServiceStop,
    Upgrade,
    PostCheck,
    ServiceStart,
    MaintenanceOff,
    Done,
    Failed,
}

impl UpgradeState {
    fn rank(self) -> u8 {
        match self {
            UpgradeState::Idle => 0,
            UpgradeState::PreCheck => 1,
            UpgradeState::MaintenanceOn => 2,
            UpgradeState::ServiceStop => 3,
            UpgradeState::Upgrade => 4,
            UpgradeState::PostCheck => 5,
            UpgradeState::ServiceStart => 6,
            UpgradeState::MaintenanceOff => 7,
            UpgradeState::Done => 8,
            UpgradeState::Failed => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UpgradeState::Done | UpgradeState::Failed)
    }

    pub fn is_cleanup(self) -> bool {
        matches!(self, UpgradeState::ServiceStart | UpgradeState::MaintenanceOff)
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: UpgradeState,
    pub to: UpgradeState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpgradeMachine {
    current: UpgradeState,
    /// State in which the failure happened.
    failed_in: Option<UpgradeState>,
    cleanups: Vec<UpgradeState>,
    history: Vec<Transition>,
}

impl Default for UpgradeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeMachine {
    pub fn new() -> Self {
        Self {
            current: UpgradeState::Idle,
            failed_in: None,
            cleanups: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> UpgradeState {
        self.current
    }

    pub fn failed_in(&self) -> Option<UpgradeState> {
        self.failed_in
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Transition> {
        self.history
    }

    fn record(&mut self, to: UpgradeState) {
        self.history.push(Transition {
            from: self.current,
            to,
            at: Utc::now(),
        });
    }

    fn invalid(&self, to: UpgradeState) -> UpdaterError {
        UpdaterError::InvalidTransition {
            from: self.current,
            to,
        }
    }

    /// Move forward to `to`. Use [`Self::fail`] for `Failed` and
    /// [`Self::cleanup`] once failed.
    pub fn advance(&mut self, to: UpgradeState) -> Result<()> {
        let allowed = !self.current.is_terminal()
            && to != UpgradeState::Failed
            && to.rank() > self.current.rank();
        if !allowed {
            return Err(self.invalid(to));
        }
        self.record(to);
        self.current = to;
        Ok(())
    }

    /// Enter `Failed` from any non-terminal state.
    pub fn fail(&mut self) -> Result<()> {
        if self.current.is_terminal() {
            return Err(self.invalid(UpgradeState::Failed));
        }
        self.failed_in = Some(self.current);
        self.record(UpgradeState::Failed);
        self.current = UpgradeState::Failed;
        Ok(())
    }

    /// Run a cleanup state after a failure. The machine stays `Failed`.
    pub fn cleanup(&mut self, state: UpgradeState) -> Result<()> {
        let ordered = self
            .cleanups
            .last()
            .is_none_or(|prev| state.rank() > prev.rank());
        let allowed = self.current == UpgradeState::Failed && state.is_cleanup() && ordered;
        if !allowed {
            return Err(self.invalid(state));
        }
        self.cleanups.push(state);
        self.history.push(Transition {
            from: UpgradeState::Failed,
            to: state,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Enter a cleanup state on whichever path the machine is on.
    pub fn enter_cleanup(&mut self, state: UpgradeState) -> Result<()> {
        if self.current == UpgradeState::Failed {
            self.cleanup(state)
        } else {
            self.advance(state)
        }
    }

    /// Number of times `state` was entered.
    pub fn times_entered(&self, state: UpgradeState) -> usize {
        self.history.iter().filter(|t| t.to == state).count()
    }
}
