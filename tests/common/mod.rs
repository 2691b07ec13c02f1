#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use appupdater::config::ConfigFile;
use appupdater::engine::Orchestrator;
use appupdater::fs::MockFileSystem;

pub use appupdater_test_utils::builders::{ConfigFileBuilder, BRANCH, REPO_URL};
pub use appupdater_test_utils::{init_tracing, with_timeout, FakeRunner, Response, ScriptedSource};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Live checkout used by `ConfigFileBuilder` defaults.
pub const APP: &str = "/var/www/moodle";

pub const LOCAL_REV: &str = "1a2b3c4d5e6f7081920a1b2c3d4e5f6071829304";
pub const REMOTE_REV: &str = "9f8e7d6c5b4a39281706f5e4d3c2b1a098765432";

pub fn version_php(release: &str, build: &str) -> String {
    format!(
        "<?php\ndefined('MOODLE_INTERNAL') || die();\n\n$version  = {build};\n$release  = '{release}';\n$branch   = '405';\n"
    )
}

/// A live git checkout with a version file and an application config.
pub fn live_install(fs: &MockFileSystem) {
    fs.add_dir(format!("{APP}/.git"));
    fs.add_file(
        format!("{APP}/version.php"),
        version_php("4.5.1 (Build: 20241209)", "2024100701.00"),
    );
    fs.add_file(format!("{APP}/config.php"), "<?php $CFG->dbname = 'moodle';");
}

/// Answer the read-only git queries: `local` is checked out, `remote` is
/// the branch tip. Register more specific rules before calling this.
pub fn fake_git(runner: &FakeRunner, local: &str, remote: &str) {
    runner
        .when(&["rev-parse", "--abbrev-ref"], Response::ok(&format!("{BRANCH}\n")))
        .when(&["rev-parse", "HEAD"], Response::ok(&format!("{local}\n")))
        .when(&["status", "--porcelain"], Response::ok(""))
        .when(
            &["show", "-s"],
            Response::ok("2025-01-10 09:30:00 +0100|Release Bot|Weekly release\n"),
        )
        .when(
            &["ls-remote"],
            Response::ok(&format!("{remote}\trefs/heads/{BRANCH}\n")),
        );
}

/// Make `git clone` populate its destination with a checkout of `build`.
pub fn clone_creates_checkout(runner: &FakeRunner, fs: &MockFileSystem, build: &'static str) {
    let fs = fs.clone();
    runner.effect(
        |cmd| cmd.mentions("clone"),
        move |cmd| {
            if let Some(dest) = cmd.args.last() {
                let dest = PathBuf::from(dest);
                fs.add_file(
                    dest.join("version.php"),
                    version_php("4.5.2 (Build: 20250210)", build),
                );
                fs.add_file(dest.join("admin/cli/upgrade.php"), "<?php");
            }
        },
    );
}

pub fn orchestrator(cfg: ConfigFile, runner: &FakeRunner, fs: &MockFileSystem) -> Orchestrator {
    Orchestrator::new(cfg, Arc::new(runner.clone()), Arc::new(fs.clone()))
}
