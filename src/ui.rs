//! Terminal output — spinners, progress bars, banners and reports.
//!
//! # Design goals
//!
//! - **One writer.** Only the main thread calls into this module.  Worker threads hand progress
//!   values back through [`crate::task::Progress`] and never print.
//! - **Testable without a terminal.** Every indicator can be built against a hidden draw target, and
//!   the string-producing helpers ([`format_mb`], [`restore_report_lines`]) are pure.

use std::path::Path;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

// ─── Icons ───────────────────────────────────────────────────────────────────

/// Braille spinner frames — same style as indicatif's default.
static SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Green ✓  — printed when a task succeeds.
fn icon_ok() -> console::StyledObject<&'static str> {
    style("✓").green().bold()
}
/// Red ✗    — printed when a task fails.
fn icon_err() -> console::StyledObject<&'static str> {
    style("✗").red().bold()
}
/// Yellow ! — cancellation and notices.
fn icon_warn() -> console::StyledObject<&'static str> {
    style("!").yellow().bold()
}
/// Cyan ✓   — printed next to the final success summary.
fn icon_done() -> console::StyledObject<&'static str> {
    style("✓").cyan().bold()
}

// ─── Indicators ───────────────────────────────────────────────────────────────

/// Where indicators draw.  `Hidden` is used by tests and when stderr is not a
/// terminal-friendly sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Draw {
    #[default]
    Terminal,
    Hidden,
}

impl Draw {
    fn target(self) -> ProgressDrawTarget {
        match self {
            Self::Terminal => ProgressDrawTarget::stderr(),
            Self::Hidden => ProgressDrawTarget::hidden(),
        }
    }
}

/// Indeterminate spinner for `label`.
///
/// Ticked explicitly by the caller's poll loop rather than a steady-tick
/// thread, so the main thread stays the only one touching the terminal.
pub fn make_spinner(label: &str, draw: Draw) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, draw.target());
    if let Ok(s) = ProgressStyle::with_template("  {spinner:.cyan}  {msg}") {
        pb.set_style(s.tick_chars(SPINNER_CHARS));
    }
    pb.set_message(format!("{}", style(label).dim()));
    pb
}

/// Percentage bar for `label`, length 100.
pub fn make_bar(label: &str, draw: Draw) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(100), draw.target());
    if let Ok(s) = ProgressStyle::with_template("  {spinner:.cyan}  {msg} [{bar:30.cyan/blue}] {pos:>3}%") {
        pb.set_style(s.tick_chars(SPINNER_CHARS).progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb
}

/// Message shown while a task runs, with the network notice appended when
/// the façade reports the connection as lost.
pub fn task_message(label: &str, network_lost: bool) -> String {
    if network_lost {
        format!("{label} {}", style("(network lost, waiting to reconnect)").yellow())
    } else {
        label.to_string()
    }
}

// ─── Lines ────────────────────────────────────────────────────────────────────

pub fn print_startup_banner(version: &str) {
    println!("{}", style(format!("Mail Export ({version})")).bold());
    println!();
}

pub fn print_task_ok(label: &str) {
    println!("  {}  {}", icon_ok(), style(label).bold());
}

pub fn print_task_failed(label: &str) {
    println!("  {}  {}", icon_err(), style(label).bold());
}

pub fn print_task_cancelled(label: &str) {
    println!("  {}  {} {}", icon_warn(), style(label).bold(), style("(cancelled)").dim());
}

pub fn print_error(msg: &str) {
    eprintln!("  {} {}", style("Error:").red().bold(), msg);
}

pub fn print_notice(msg: &str) {
    println!("  {}  {}", icon_warn(), msg);
}

pub fn print_ctrl_c_ack() {
    eprintln!();
    eprintln!("  {}  Received Ctrl+C, exiting as soon as possible", icon_warn());
}

pub fn print_done(msg: &str) {
    println!();
    println!("  {} {}", icon_done(), style(msg).cyan().bold());
    println!();
}

// ─── Formatting ──────────────────────────────────────────────────────────────

/// Whole megabytes, rounded up so a non-empty size never shows as `0 MB`.
pub fn format_mb(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    format!("{} MB", bytes.div_ceil(MB))
}

/// Final counters of a restore, one line each.
pub fn restore_report_lines(importable: u64, imported: u64, failed: u64, skipped: u64) -> Vec<String> {
    vec![
        format!("Importable messages: {importable}"),
        format!("Imported:            {imported}"),
        format!("Failed:              {failed}"),
        format!("Skipped:             {skipped}"),
    ]
}

pub fn print_export_finished(path: &Path) {
    print_done("Export Finished");
    println!("  Mail was exported to {}", style(path.display()).bold());
    println!();
}

pub fn print_restore_report(importable: u64, imported: u64, failed: u64, skipped: u64) {
    print_done("Restore Finished");
    for line in restore_report_lines(importable, imported, failed, skipped) {
        println!("    {line}");
    }
    println!();
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── format_mb ────────────────────────────────────────────────────────────

    #[test]
    fn format_mb_rounds_up() {
        assert_eq!(format_mb(0), "0 MB");
        assert_eq!(format_mb(1), "1 MB");
        assert_eq!(format_mb(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_mb(10 * 1024 * 1024 + 1), "11 MB");
    }

    // ── task_message ─────────────────────────────────────────────────────────

    #[test]
    fn task_message_without_network_loss_is_label() {
        assert_eq!(task_message("Export Mail", false), "Export Mail");
    }

    #[test]
    fn task_message_mentions_network_loss() {
        let msg = task_message("Export Mail", true);
        assert!(msg.starts_with("Export Mail"));
        assert!(msg.contains("network lost"));
    }

    // ── restore report ───────────────────────────────────────────────────────

    #[test]
    fn restore_report_lists_all_counters() {
        let lines = restore_report_lines(10, 7, 2, 1).join("\n");
        insta::assert_snapshot!(lines, @r"
        Importable messages: 10
        Imported:            7
        Failed:              2
        Skipped:             1
        ");
    }

    // ── indicators ───────────────────────────────────────────────────────────

    #[test]
    fn hidden_bar_tracks_position() {
        let bar = make_bar("Export Mail", Draw::Hidden);
        bar.set_position(42);
        assert_eq!(bar.position(), 42);
        assert_eq!(bar.length(), Some(100));
    }

    #[test]
    fn hidden_spinner_has_no_length() {
        let spinner = make_spinner("Performing Login", Draw::Hidden);
        assert_eq!(spinner.length(), None);
        spinner.finish_and_clear();
    }
}
