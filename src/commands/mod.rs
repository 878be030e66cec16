//! Operation orchestrators — what runs once login has succeeded.
//!
//! | File         | Operation | Description                                   |
//! |--------------|-----------|-----------------------------------------------|
//! | `backup.rs`  | `backup`  | Resolve export dir, check space, export mail  |
//! | `restore.rs` | `restore` | Resolve backup dir, import mail, report       |
//!
//! Both are one-shot: the task runs once under the [`TaskRunner`] and any
//! failure ends the operation.  Partial output is left where it is.

pub mod backup;
pub mod restore;

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    disk::DiskSpace,
    prompt::{PromptError, Prompter},
    runner::TaskRunner,
    session::{Session, SessionError},
};

/// Collaborators an operation needs.
pub struct Context<'a> {
    pub session: &'a dyn Session,
    pub prompter: &'a mut dyn Prompter,
    pub runner: &'a TaskRunner,
    pub disks: &'a dyn DiskSpace,
    /// Platform output directory: parent of the default export path and the
    /// base for relative paths.
    pub output_dir: &'a Path,
}

/// How an operation ended, short of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    /// The user chose not to proceed.
    Declined,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid directory {}: {reason}", path.display())]
    InvalidDir { path: PathBuf, reason: &'static str },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to export: {0}")]
    Backup(SessionError),

    #[error("failed to restore: {0}")]
    Restore(SessionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Prompt(PromptError),
}

impl From<PromptError> for OperationError {
    fn from(err: PromptError) -> Self {
        Self::Prompt(err)
    }
}

impl OperationError {
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Prompt(PromptError::Cancelled))
    }
}

/// `path` as-is when absolute, otherwise under `base`.
pub fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
