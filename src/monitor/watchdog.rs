// src/monitor/watchdog.rs

//! Periodic sampling task that runs alongside a stage.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::monitor::detector::{Detector, MonitorWarning};
use crate::monitor::signal::SignalSource;
use crate::types::format_bytes;

/// A not-yet-started monitor: a signal, the rule applied to it and a
/// sampling interval.
pub struct StageMonitor {
    source: Box<dyn SignalSource>,
    detector: Detector,
    interval: Duration,
    progress_every: Option<Duration>,
}

impl fmt::Debug for StageMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageMonitor")
            .field("source", &self.source.name())
            .field("detector", &self.detector)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl StageMonitor {
    pub fn new(source: Box<dyn SignalSource>, detector: Detector, interval: Duration) -> Self {
        Self {
            source,
            detector,
            interval,
            progress_every: None,
        }
    }

    /// Log the current value at info level at most this often.
    pub fn log_progress_every(mut self, every: Duration) -> Self {
        self.progress_every = Some(every);
        self
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Spawn the sampling task. The first sample is taken immediately.
    pub fn start(self) -> MonitorHandle {
        let name = self.source.name().to_string();
        let (stop_tx, stop_rx) = oneshot::channel();
        debug!(monitor = %name, interval = ?self.interval, "starting monitor");
        let task = tokio::spawn(sample_loop(self, stop_rx));
        MonitorHandle {
            name,
            stop_tx: Some(stop_tx),
            task: Some(task),
            warnings: Vec::new(),
        }
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle also ends the sampling task, but only
/// [`MonitorHandle::stop`] returns the collected warnings.
#[derive(Debug)]
pub struct MonitorHandle {
    name: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<MonitorWarning>>>,
    warnings: Vec<MonitorWarning>,
}

impl MonitorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop sampling and return all warnings raised so far.
    ///
    /// When this returns, the sampling task has exited, so no sample is
    /// taken after the stage ended. Calling it again returns the same
    /// warnings.
    pub async fn stop(&mut self) -> Vec<MonitorWarning> {
        if let Some(tx) = self.stop_tx.take() {
            // The loop may already have ended; that's fine.
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(warnings) => self.warnings = warnings,
                Err(e) => warn!(monitor = %self.name, error = %e, "monitor task failed"),
            }
            debug!(monitor = %self.name, warnings = self.warnings.len(), "monitor stopped");
        }
        self.warnings.clone()
    }
}

async fn sample_loop(
    monitor: StageMonitor,
    mut stop_rx: oneshot::Receiver<()>,
) -> Vec<MonitorWarning> {
    let StageMonitor {
        mut source,
        mut detector,
        interval,
        progress_every,
    } = monitor;
    let progress_every = progress_every.filter(|_| detector.reports_progress());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut warnings = Vec::new();
    let mut last_progress: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            // Either an explicit stop or a dropped handle.
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        let value = match source.read() {
            Ok(value) => value,
            Err(e) => {
                debug!(monitor = source.name(), error = %e, "sample skipped");
                continue;
            }
        };
        let capacity = source.capacity();
        let obs = detector.observe(source.name(), Utc::now(), value, capacity);
        trace!(monitor = source.name(), value, flag = ?obs.sample.flag, "sample");

        if let Some(warning) = obs.warning {
            warn!(monitor = source.name(), "{warning}");
            warnings.push(warning);
        }

        if let Some(every) = progress_every {
            let due = last_progress.is_none_or(|at| at.elapsed() >= every);
            if due {
                info!(monitor = source.name(), "{} written", format_bytes(value));
                last_progress = Some(Instant::now());
            }
        }
    }

    warnings
}
