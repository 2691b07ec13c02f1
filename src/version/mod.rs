// src/version/mod.rs

//! Version comparison between the live checkout and the remote branch.

pub mod comparator;
pub mod git;
pub mod release;

pub use comparator::{is_update_applicable, RemoteRef, UpdateDecision, VersionComparator, VersionInfo};
pub use git::{CommitMeta, GitClient};
pub use release::{detect_release, AppRelease};
