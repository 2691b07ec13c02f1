// src/engine/mod.rs

//! Wiring of the core components into one update run.
//!
//! `planner` is pure (config in, stage specs and upgrade plan out);
//! `orchestrator` is the async shell that executes them.

pub mod orchestrator;
pub mod planner;

pub use orchestrator::Orchestrator;
pub use planner::{timestamp, Planner, RunPaths};
