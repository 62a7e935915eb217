//! Shared E2E test helpers for `courier` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Environment variables that would leak host configuration into a test.
const COURIER_ENV_VARS: &[&str] = &[
    "COURIER_DEBUG",
    "COURIER_INSTANCE_ID",
    "COURIER_MAX_RECONNECTS",
    "COURIER_CANCEL_GRACE_MS",
    "COURIER_CALL_TIMEOUT_MS",
    "RUST_LOG",
];

/// Build a Command for the `courier` binary rooted at a fresh project dir.
///
/// The global config is skipped and `COURIER_*` variables are removed.
/// Returns (command, _guard); keep the guard alive for the test's duration.
pub fn courier_cmd() -> (assert_cmd::Command, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create temp project dir");
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("courier");
    cmd.timeout(TIMEOUT_BASIC);
    for var in COURIER_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args([
        "--no-global-config",
        "-C",
        tmp.path().to_str().expect("valid utf8"),
    ]);
    (cmd, tmp)
}

/// Writes `.courier/config.toml` under `root`.
pub fn write_project_config(root: &std::path::Path, toml: &str) {
    let dir = root.join(".courier");
    std::fs::create_dir_all(&dir).expect("create .courier");
    std::fs::write(dir.join("config.toml"), toml).expect("write config");
}
