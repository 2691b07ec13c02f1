// src/stage/mod.rs

//! Stage descriptions, execution and results.

pub mod result;
pub mod runner;
pub mod spec;

pub use result::{StageKind, StageOutcome, StageResult};
pub use runner::{run_stage, StageContext};
pub use spec::{StageSpec, StageStep};
