// src/version/release.rs

//! Human-readable release detection from the application's version file.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::fs::FileSystem;

/// Candidate version files, relative to a checkout. Newer layouts keep the
/// code under `public/`.
pub const VERSION_FILES: [&str; 2] = ["public/version.php", "version.php"];

/// `$release` and `$version` as declared in the version file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppRelease {
    /// e.g. `4.5.2+ (Build: 20250221)`
    pub release: String,
    /// e.g. `2024100702.05`
    pub build: Option<String>,
}

impl AppRelease {
    fn build_number(&self) -> Option<f64> {
        self.build.as_deref()?.parse().ok()
    }

    /// Compare build numbers; `None` if either side has none.
    pub fn compare_build(&self, other: &AppRelease) -> Option<Ordering> {
        self.build_number()?.partial_cmp(&other.build_number()?)
    }
}

impl fmt::Display for AppRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.build {
            Some(ref build) => write!(f, "{} [{}]", self.release, build),
            None => write!(f, "{}", self.release),
        }
    }
}

/// Parse PHP version-file source.
pub fn parse_version_file(content: &str) -> Option<AppRelease> {
    let release_re = Regex::new(r"\$release\s*=\s*'([^']+)'").ok()?;
    let build_re = Regex::new(r"\$version\s*=\s*([0-9.]+)\s*;").ok()?;

    let release = release_re.captures(content)?.get(1)?.as_str().trim().to_string();
    let build = build_re
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(AppRelease { release, build })
}

/// Read the release declared by the checkout at `app_path`, if any.
pub fn detect_release(fs: &dyn FileSystem, app_path: &Path) -> Option<AppRelease> {
    VERSION_FILES.iter().find_map(|rel| {
        let path = app_path.join(rel);
        if !fs.exists(&path) {
            return None;
        }
        match fs.read_to_string(&path) {
            Ok(content) => parse_version_file(&content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read version file");
                None
            }
        }
    })
}
