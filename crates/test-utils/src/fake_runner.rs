// crates/test-utils/src/fake_runner.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use appupdater::errors::{Result, UpdaterError};
use appupdater::exec::{BoxFuture, CommandSpec, ExitOutcome, ProcessOutput, ProcessRunner};

/// What the fake returns for a matching command.
#[derive(Debug, Clone)]
pub enum Response {
    Output(ProcessOutput),
    /// The program could not be started at all.
    SpawnError(String),
}

impl Response {
    pub fn ok(stdout: &str) -> Self {
        Response::Output(ProcessOutput {
            outcome: ExitOutcome::Success,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Response::Output(ProcessOutput {
            outcome: ExitOutcome::from_code(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
        })
    }

    pub fn timed_out() -> Self {
        Response::Output(ProcessOutput {
            outcome: ExitOutcome::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }
}

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;
type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct Rule {
    matcher: Matcher,
    response: Response,
    delay: Option<Duration>,
}

#[derive(Default)]
struct State {
    calls: Vec<CommandSpec>,
    rules: Vec<Rule>,
    effects: Vec<(Matcher, Effect)>,
}

/// A fake process runner that:
/// - records every command it is asked to run
/// - answers with the first registered rule that matches, or a plain
///   success with empty output.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Respond to commands matching `matcher`.
    pub fn on<F>(&self, matcher: F, response: Response) -> &Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.on_delayed(matcher, response, None)
    }

    /// Like [`FakeRunner::on`], but sleep before answering.
    pub fn on_delayed<F>(&self, matcher: F, response: Response, delay: Option<Duration>) -> &Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.lock().rules.push(Rule {
            matcher: Box::new(matcher),
            response,
            delay,
        });
        self
    }

    /// Run `effect` whenever a command matching `matcher` is run, e.g. to
    /// create the files a real tool would have written.
    pub fn effect<F, E>(&self, matcher: F, effect: E) -> &Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
        E: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.lock().effects.push((Box::new(matcher), Box::new(effect)));
        self
    }

    /// Respond to commands whose program or arguments include every needle.
    pub fn when(&self, needles: &[&str], response: Response) -> &Self {
        let needles: Vec<String> = needles.iter().map(|s| s.to_string()).collect();
        self.on(move |cmd| needles.iter().all(|n| cmd.mentions(n)), response)
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of recorded calls that mention every needle.
    pub fn count(&self, needles: &[&str]) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|cmd| needles.iter().all(|n| cmd.mentions(n)))
            .count()
    }

    /// Recorded calls rendered as strings, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.lock().calls.iter().map(ToString::to_string).collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run<'a>(&'a self, cmd: &'a CommandSpec) -> BoxFuture<'a, Result<ProcessOutput>> {
        let (response, delay) = {
            let mut state = self.lock();
            state.calls.push(cmd.clone());
            for (matcher, effect) in &state.effects {
                if matcher(cmd) {
                    effect(cmd);
                }
            }
            state
                .rules
                .iter()
                .find(|r| (r.matcher)(cmd))
                .map(|r| (r.response.clone(), r.delay))
                .unwrap_or_else(|| (Response::ok(""), None))
        };

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match response {
                Response::Output(mut out) => {
                    if let Some(delay) = delay {
                        out.duration = delay;
                    }
                    Ok(out)
                }
                Response::SpawnError(msg) => Err(UpdaterError::Spawn {
                    command: cmd.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, msg),
                }),
            }
        })
    }
}
