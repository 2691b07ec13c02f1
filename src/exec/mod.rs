// src/exec/mod.rs

//! Process execution layer.
//!
//! This is the sole execution primitive used by every stage:
//!
//! - [`command`] describes a command as a fixed argument vector and the
//!   result of running it.
//! - [`backend`] provides the `ProcessRunner` trait and the dry-run runner.
//! - [`process`] provides `TokioProcessRunner`, which the orchestrator uses
//!   in production and which tests replace with a fake implementation.

pub mod backend;
pub mod command;
pub mod process;

pub use backend::{action_runner, BoxFuture, DryRunRunner, ProcessRunner};
pub use command::{CommandSpec, ExitOutcome, ProcessOutput};
pub use process::TokioProcessRunner;
