//! Session façade contract.
//!
//! Everything that talks to the account service lives behind these traits so
//! that the login and operation orchestrators can be driven by an in-memory
//! fake in tests.  The binary plugs in [`crate::remote::RemoteSession`].
//!
//! All methods take `&self`: a backup's `cancel` is called from the main
//! thread while its `start` is still running on the task runner's worker, so
//! implementations keep their mutable state behind atomics or locks.

use std::{fmt, path::Path};

use thiserror::Error;

// ─── Login state ──────────────────────────────────────────────────────────────

/// Stage of the multi-step authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    LoggedOut,
    AwaitingTotp,
    AwaitingHv,
    AwaitingMailboxPassword,
    LoggedIn,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoggedOut => "logged out",
            Self::AwaitingTotp => "awaiting TOTP code",
            Self::AwaitingHv => "awaiting human verification",
            Self::AwaitingMailboxPassword => "awaiting mailbox password",
            Self::LoggedIn => "logged in",
        };
        f.write_str(name)
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Failure reported by the façade.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The service rejected the request (bad credentials, bad code, ...).
    #[error("{0}")]
    Protocol(String),

    /// The service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The service refuses to talk to this version of the tool.
    #[error("this version is no longer supported: {0}")]
    KillSwitch(String),

    /// The operation stopped because `cancel` was called.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Login steps that fail with a recoverable error are retried; anything
    /// else aborts the run.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Network(_))
    }
}

// ─── Collaborator traits ──────────────────────────────────────────────────────

/// Asynchronous reachability notifications, invoked on the façade's thread.
pub trait NetworkCallback: Send + Sync {
    fn on_network_lost(&self);
    fn on_network_restored(&self);
}

/// Outcome of the start-up version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionStatus {
    UpToDate,
    UpdateAvailable { latest: String, url: String },
}

/// Which start-up inputs were taken from environment variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct StartupInputs {
    pub operation: bool,
    pub dir: bool,
    pub password: bool,
    pub mailbox_password: bool,
    pub totp: bool,
    pub email: bool,
}

/// Authenticated connection to the account service.
pub trait Session: Send + Sync {
    fn login(&self, email: &str, password: &str) -> Result<LoginState, SessionError>;
    fn login_totp(&self, code: &str) -> Result<LoginState, SessionError>;
    fn login_mailbox_password(&self, password: &str) -> Result<LoginState, SessionError>;
    fn mark_hv_solved(&self) -> Result<LoginState, SessionError>;
    fn hv_solve_url(&self) -> Result<String, SessionError>;
    fn email(&self) -> Result<String, SessionError>;

    fn check_version(&self) -> Result<VersionStatus, SessionError>;

    fn new_backup(&self, export_path: &Path) -> Result<Box<dyn Backup + '_>, SessionError>;
    fn new_restore(&self, backup_path: &Path) -> Result<Box<dyn Restore + '_>, SessionError>;

    /// Abort whatever login request is in flight.  Advisory.
    fn cancel(&self) {}

    fn set_using_default_export_path(&self, _using_default: bool) {}
    fn send_process_start_telemetry(&self, _inputs: StartupInputs) {}

    /// Forward an unexpected failure to the error-reporting backend.
    fn report_error(&self, _message: &str) {}
}

/// A mail export in preparation or in progress.
pub trait Backup: Send + Sync {
    /// Run the export, reporting progress in `[0.0, 1.0]`.
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError>;
    fn cancel(&self);
    fn export_path(&self) -> &Path;
    /// Estimated bytes the export will write.
    fn expected_disk_usage(&self) -> Result<u64, SessionError>;
}

/// A mail import in preparation or in progress.
///
/// The counters are only meaningful once `start` has returned.
pub trait Restore: Send + Sync {
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError>;
    fn cancel(&self);
    fn backup_path(&self) -> &Path;
    fn importable_count(&self) -> u64;
    fn imported_count(&self) -> u64;
    fn failed_count(&self) -> u64;
    fn skipped_count(&self) -> u64;
}

// ─── Tests ────────────────────────────────────────────────────────────────────
