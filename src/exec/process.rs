// src/exec/process.rs

//! Real process runner on top of `tokio::process`.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, UpdaterError};
use crate::exec::backend::{BoxFuture, ProcessRunner};
use crate::exec::command::{CommandSpec, ExitOutcome, ProcessOutput};

/// Production runner: spawns each command as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(&'a self, cmd: &'a CommandSpec) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(run_process(cmd))
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn run_process(spec: &CommandSpec) -> Result<ProcessOutput> {
    debug!(command = %spec, timeout = ?spec.timeout, "starting process");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref dir) = spec.cwd {
        cmd.current_dir(dir);
    }

    match spec.stdout_to {
        Some(ref path) => {
            let file = std::fs::File::create(path)?;
            cmd.stdout(Stdio::from(file));
        }
        None => {
            cmd.stdout(Stdio::piped());
        }
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| UpdaterError::Spawn {
        command: spec.to_string(),
        source,
    })?;

    // Always consume both pipes so buffers don't fill.
    let stdout_reader = child
        .stdout
        .take()
        .map(|out| spawn_collector(out, spec.program.clone(), Stream::Stdout, spec.echo_output));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| spawn_collector(err, spec.program.clone(), Stream::Stderr, spec.echo_output));

    let outcome = match spec.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(command = %spec, timeout = ?limit, "process timed out; killing");
                if let Err(e) = child.kill().await {
                    warn!(command = %spec, error = %e, "failed to kill timed-out process");
                }
                None
            }
        },
        None => Some(child.wait().await?),
    };

    let outcome = match outcome {
        Some(status) => ExitOutcome::from_code(status.code().unwrap_or(-1)),
        None => ExitOutcome::TimedOut,
    };

    // After a timeout, grandchildren may still hold the pipes open; don't wait
    // on them.
    let timed_out = outcome == ExitOutcome::TimedOut;
    let stdout = finish_collector(stdout_reader, timed_out).await;
    let stderr = finish_collector(stderr_reader, timed_out).await;
    let duration = started.elapsed();

    debug!(
        command = %spec,
        outcome = %outcome,
        elapsed_ms = duration.as_millis() as u64,
        "process finished"
    );

    Ok(ProcessOutput {
        outcome,
        stdout,
        stderr,
        duration,
    })
}

fn spawn_collector<R>(reader: R, program: String, stream: Stream, echo: bool) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut collected = String::new();

        // Decode lossily and keep draining to EOF.
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(program = %program, error = %e, "output stream read failed");
                    break;
                }
            }
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf);
            match (stream, echo) {
                (Stream::Stdout, true) => info!(program = %program, "{}", line),
                (Stream::Stderr, true) => warn!(program = %program, "{}", line),
                (Stream::Stdout, false) => debug!(program = %program, "stdout: {}", line),
                (Stream::Stderr, false) => debug!(program = %program, "stderr: {}", line),
            }
            collected.push_str(&line);
            collected.push('\n');
        }

        collected
    })
}

async fn finish_collector(handle: Option<JoinHandle<String>>, abort: bool) -> String {
    match handle {
        Some(handle) if abort => {
            handle.abort();
            String::new()
        }
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
