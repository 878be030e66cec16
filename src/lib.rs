//! `mail-export` — interactive backup and restore of a remote mail account.
//!
//! # Overview
//!
//! The binary logs in to the account service (password, optional TOTP code,
//! optional human verification, optional mailbox password), then either
//! exports every message to a local directory or imports a previous export
//! back.  Every blocking call runs on a worker thread behind a spinner or a
//! progress bar while the main thread watches for Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! mail-export                                  # ask for everything
//! mail-export -o backup -u alice@example.com   # back up, ask for the password
//! ET_OPERATION=restore ET_DIR=~/mail mail-export
//! mail-export --telemetry-off                  # no usage telemetry
//! ```
//!
//! # Module layout
//!
//! | Module                   | Responsibility                                  |
//! |--------------------------|-------------------------------------------------|
//! | [`cli`]                  | Argument types parsed by clap, `Options`        |
//! | [`config`]               | `Config` struct + TOML loader                   |
//! | [`logging`]              | Per-run log file                                |
//! | [`signal`]               | Quit signal, network status, cancellable waits  |
//! | [`session`]              | Session façade traits and errors                |
//! | [`remote`]               | HTTP implementation of the façade               |
//! | [`task`]                 | `Task` trait and closure-backed `Step`          |
//! | [`runner`]               | Worker thread + spinner/bar poll loop           |
//! | [`prompt`]               | Cancellation-aware terminal prompts             |
//! | [`login`]                | Login state machine and retry policy            |
//! | [`disk`]                 | Free-space probe and backup precondition        |
//! | [`commands::backup`]     | Backup orchestrator                             |
//! | [`commands::restore`]    | Restore orchestrator                            |
//! | [`app`]                  | Top-level sequencing and exit status            |
//! | [`ui`]                   | Spinner, bar, notices and reports               |

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod disk;
pub mod logging;
pub mod login;
pub mod prompt;
pub mod remote;
pub mod runner;
pub mod session;
pub mod signal;
pub mod task;
pub mod ui;
