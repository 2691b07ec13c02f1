// src/monitor/signal.rs

//! Measurable signals a [`StageMonitor`](super::StageMonitor) can sample.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use sysinfo::System;

use crate::fs::FileSystem;

/// A numeric reading taken once per sampling tick.
///
/// `read` is called from the monitor's own task, never from the stage it
/// supervises. An `Err` skips that tick.
pub trait SignalSource: Send + 'static {
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<u64>;

    /// Upper bound of the signal, used for percentage thresholds.
    fn capacity(&mut self) -> Option<u64> {
        None
    }
}

/// Size of a file that a stage is writing. A missing file reads as 0.
#[derive(Debug)]
pub struct FileSizeSource {
    name: String,
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileSizeSource {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path, fs }
    }
}

impl SignalSource for FileSizeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<u64> {
        Ok(self.fs.file_size(&self.path)?.unwrap_or(0))
    }
}

/// Available system memory in bytes.
pub struct AvailableMemorySource {
    system: System,
}

impl AvailableMemorySource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for AvailableMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for AvailableMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&mut self) -> Result<u64> {
        self.system.refresh_memory();
        // Some platforms don't report "available"; fall back to free.
        let available = match self.system.available_memory() {
            0 => self.system.free_memory(),
            n => n,
        };
        Ok(available)
    }

    fn capacity(&mut self) -> Option<u64> {
        match self.system.total_memory() {
            0 => None,
            total => Some(total),
        }
    }
}
