// src/exec/backend.rs

//! Pluggable process runner abstraction.
//!
//! Every stage talks to a `ProcessRunner` instead of spawning processes
//! directly. This makes it easy to swap in a fake runner in tests while
//! keeping the production implementation in [`super::process`].
//!
//! - [`TokioProcessRunner`](super::TokioProcessRunner) spawns real OS
//!   processes.
//! - [`DryRunRunner`] logs each command and returns a synthetic success
//!   without executing anything.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use crate::errors::Result;
use crate::exec::command::{CommandSpec, ProcessOutput};

/// Boxed future returned by runner methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting how external commands are executed.
///
/// Implementations block their own future until the child exits (or times
/// out). A non-zero exit is returned as data, not as an `Err`; errors are
/// reserved for commands that could not be run at all.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(&'a self, cmd: &'a CommandSpec) -> BoxFuture<'a, Result<ProcessOutput>>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for Arc<R> {
    fn run<'a>(&'a self, cmd: &'a CommandSpec) -> BoxFuture<'a, Result<ProcessOutput>> {
        (**self).run(cmd)
    }
}

/// Runner used when dry-run mode is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl ProcessRunner for DryRunRunner {
    fn run<'a>(&'a self, cmd: &'a CommandSpec) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(async move {
            match cmd.cwd {
                Some(ref dir) => info!(command = %cmd, cwd = %dir.display(), "[dry-run] would run"),
                None => info!(command = %cmd, "[dry-run] would run"),
            }
            Ok(ProcessOutput::synthetic_success())
        })
    }
}

/// Runner for commands that change the target system.
///
/// In dry-run mode `inner` is dropped unused and every command is only
/// logged.
pub fn action_runner<R>(inner: R, dry_run: bool) -> Arc<dyn ProcessRunner>
where
    R: ProcessRunner + 'static,
{
    if dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(inner)
    }
}
