// crates/test-utils/src/scripted_source.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use appupdater::monitor::SignalSource;

/// Deterministic signal: yields the scripted values in order, then errors
/// (which the monitor treats as a skipped sample).
///
/// Clones share the script, so a test can keep one to observe progress.
#[derive(Clone)]
pub struct ScriptedSource {
    name: String,
    values: Arc<Mutex<VecDeque<u64>>>,
    reads: Arc<AtomicUsize>,
    total: usize,
    capacity: Option<u64>,
}

impl ScriptedSource {
    pub fn new(name: &str, values: &[u64]) -> Self {
        Self {
            name: name.to_string(),
            values: Arc::new(Mutex::new(values.iter().copied().collect())),
            reads: Arc::new(AtomicUsize::new(0)),
            total: values.len(),
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn remaining(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Number of `read` calls so far, including ones past the end.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Wait until every scripted value has been read and processed, i.e.
    /// the monitor has already attempted one read past the end.
    pub async fn wait_exhausted(&self) {
        while self.reads() <= self.total {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }
}

impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> anyhow::Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("script lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }

    fn capacity(&mut self) -> Option<u64> {
        self.capacity
    }
}
