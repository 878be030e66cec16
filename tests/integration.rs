//! Integration tests for the `mail-export` binary.
//!
//! These tests spawn the compiled binary and assert on exit codes, stdout and
//! stderr.  No account service is needed: every run either stops before the
//! first request or points `ET_API_URL` at a closed local port, and stdin is
//! closed so any prompt resolves as cancelled.
//!
//! # Running
//!
//! ```sh
//! cargo test --test integration
//! ```

use std::{
    path::Path,
    process::{Command, Stdio},
};

/// Absolute path to the compiled binary, resolved at compile time by Cargo.
const BIN: &str = env!("CARGO_BIN_EXE_mail-export");

const ET_VARS: [&str; 8] = [
    "ET_OPERATION",
    "ET_DIR",
    "ET_USER_EMAIL",
    "ET_USER_PASSWORD",
    "ET_USER_MAILBOX_PASSWORD",
    "ET_TOTP_CODE",
    "ET_TELEMETRY_OFF",
    "ET_API_URL",
];

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Run the binary with `args` and `env`, isolated under `home`.
///
/// Returns `(exit_success, stdout, stderr)`.
fn run_with(args: &[&str], env: &[(&str, &str)], home: &Path) -> (bool, String, String) {
    let mut cmd = Command::new(BIN);
    for var in ET_VARS {
        cmd.env_remove(var);
    }
    let out = cmd
        .args(args)
        .arg("--config")
        .arg(home.join("config.toml"))
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("ET_API_URL", "http://127.0.0.1:9")
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .current_dir(home)
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn {BIN}: {e}"));

    (
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

fn run(args: &[&str], env: &[(&str, &str)]) -> (bool, String, String) {
    let home = tempfile::tempdir().unwrap();
    run_with(args, env, home.path())
}

// ─── --help / --version ───────────────────────────────────────────────────────

#[test]
fn help_exits_zero() {
    let (ok, stdout, _) = run(&["--help"], &[]);
    assert!(ok, "--help should exit 0");
    assert!(stdout.contains("mail-export"));
    assert!(stdout.contains("--operation"));
    assert!(stdout.contains("ET_OPERATION"), "help should name the env bindings");
}

#[test]
fn version_exits_zero() {
    let (ok, stdout, _) = run(&["--version"], &[]);
    assert!(ok, "--version should exit 0");
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_hides_secret_env_values() {
    let (ok, stdout, _) = run(&["--help"], &[("ET_USER_PASSWORD", "s3cret-value")]);
    assert!(ok);
    assert!(!stdout.contains("s3cret-value"));
}

// ─── Argument errors ─────────────────────────────────────────────────────────

#[test]
fn unknown_flag_fails() {
    let (ok, _, stderr) = run(&["--no-such-flag"], &[]);
    assert!(!ok);
    assert!(stderr.contains("--no-such-flag"));
}

#[test]
fn unknown_operation_fails() {
    let (ok, _, stderr) = run(&["--operation", "sync"], &[]);
    assert!(!ok);
    assert!(stderr.contains("sync"));
}

#[test]
fn invalid_config_file_fails() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), "[api\nurl =").unwrap();
    let (ok, _, stderr) = run_with(&[], &[], home.path());
    assert!(!ok);
    assert!(stderr.contains("parsing"), "stderr: {stderr}");
}

// ─── Fatal before login ──────────────────────────────────────────────────────

#[test]
fn restore_from_missing_env_dir_fails() {
    let (ok, stdout, stderr) = run(&[], &[("ET_OPERATION", "restore"), ("ET_DIR", "/nonexistent/mail-export-backup")]);
    assert!(!ok, "an invalid ET_DIR must be fatal");
    assert!(stderr.contains("Error:"), "stderr: {stderr}");
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
    assert!(!stdout.contains("Username"), "must fail before any login prompt");
}

// ─── Closed stdin ────────────────────────────────────────────────────────────

#[test]
fn closed_stdin_at_operation_prompt_exits_zero() {
    let (ok, stdout, _) = run(&[], &[]);
    assert!(ok, "closed input is a cancellation, not a failure");
    assert!(stdout.contains("Mail Export ("));
}

#[test]
fn empty_env_operation_counts_as_absent() {
    let (ok, stdout, _) = run(&[], &[("ET_OPERATION", "")]);
    assert!(ok);
    assert!(stdout.contains("Operation"), "the operation should be asked for: {stdout}");
}

#[test]
fn unreachable_service_still_reaches_login() {
    let (ok, stdout, _) = run(&["--operation", "backup", "--telemetry-off"], &[]);
    assert!(ok, "closed input at the username prompt exits 0");
    assert!(stdout.contains("Username"), "stdout: {stdout}");
}

#[test]
fn log_file_is_written() {
    let home = tempfile::tempdir().unwrap();
    let logs = home.path().join("run-logs");
    std::fs::write(
        home.path().join("config.toml"),
        format!("[paths]\nlog_dir = {:?}\n", logs.display().to_string()),
    )
    .unwrap();

    let (ok, _, _) = run_with(&[], &[], home.path());
    assert!(ok);

    let names: Vec<String> = std::fs::read_dir(&logs)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1, "{names:?}");
    assert!(names[0].ends_with("_export.log"));
}
