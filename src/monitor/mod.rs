// src/monitor/mod.rs

//! Stage monitors: stall and low-resource watchdogs.
//!
//! A monitor pairs a [`SignalSource`] (what to read) with a [`Detector`]
//! (how to judge it) and samples on a fixed interval until stopped.
//! Warnings are advisory and end up on the supervised stage's result.

pub mod detector;
pub mod signal;
pub mod watchdog;

pub use detector::{
    Detector, GrowthDetector, MonitorSample, MonitorWarning, Observation, ResourceDetector,
    SampleFlag,
};
pub use signal::{AvailableMemorySource, FileSizeSource, SignalSource};
pub use watchdog::{MonitorHandle, StageMonitor};
