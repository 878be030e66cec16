//! `restore` — import a previous export back into the account.

use std::path::{Path, PathBuf};

use crate::{
    commands::{Context, OperationError, OperationOutcome},
    prompt::{Prompter, check_existing_dir},
    runner::RunError,
    session::{Restore, SessionError},
    task::{Progress, ProgressKind, Task},
    ui,
};

/// Counters of a finished restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreReport {
    pub importable: u64,
    pub imported: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RestoreReport {
    pub fn of(restore: &dyn Restore) -> Self {
        Self {
            importable: restore.importable_count(),
            imported: restore.imported_count(),
            failed: restore.failed_count(),
            skipped: restore.skipped_count(),
        }
    }
}

/// Check a directory given on the command line or through the environment.
///
/// There is no one to re-ask in that case, so an invalid path is fatal.
pub fn validate_backup_dir(path: &Path) -> Result<PathBuf, OperationError> {
    check_existing_dir(path).map_err(|reason| OperationError::InvalidDir {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(path.to_path_buf())
}

/// The explicit directory if there is one, otherwise ask for it.
pub fn resolve_backup_dir(prompter: &mut dyn Prompter, explicit: Option<&Path>) -> Result<PathBuf, OperationError> {
    match explicit {
        Some(path) => validate_backup_dir(path),
        None => Ok(prompter.read_dir("Backup Path")?),
    }
}

/// A running import.
pub struct RestoreTask<'s> {
    restore: Box<dyn Restore + 's>,
}

impl<'s> RestoreTask<'s> {
    pub fn new(restore: Box<dyn Restore + 's>) -> Self {
        Self { restore }
    }

    pub fn backup_path(&self) -> &Path {
        self.restore.backup_path()
    }

    pub fn report(&self) -> RestoreReport {
        RestoreReport::of(self.restore.as_ref())
    }
}

impl Task for RestoreTask<'_> {
    type Output = ();
    type Error = SessionError;

    fn description(&self) -> &str {
        "Importing mail"
    }

    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::Percentage
    }

    fn run(&self, progress: &Progress) -> Result<(), SessionError> {
        self.restore.start(&|value| progress.set(value))
    }

    fn cancel(&self) {
        self.restore.cancel();
    }
}

/// Run the restore operation for the logged-in account.
pub fn run(ctx: &mut Context<'_>, explicit_dir: Option<&Path>) -> Result<OperationOutcome, OperationError> {
    let dir = match resolve_backup_dir(ctx.prompter, explicit_dir) {
        Ok(dir) => dir,
        Err(e) if e.is_cancellation() => return Ok(OperationOutcome::Cancelled),
        Err(e) => return Err(e),
    };
    tracing::info!(path = %dir.display(), "backup directory resolved");

    if ctx.runner.state().should_quit() {
        return Ok(OperationOutcome::Cancelled);
    }

    let task = RestoreTask::new(ctx.session.new_restore(&dir)?);
    let result = ctx.runner.run(&task);
    let report = task.report();
    tracing::info!(
        path = %task.backup_path().display(),
        importable = report.importable,
        imported = report.imported,
        failed = report.failed,
        skipped = report.skipped,
        "restore stopped"
    );

    match result {
        Ok(()) => {
            ui::print_restore_report(report.importable, report.imported, report.failed, report.skipped);
            Ok(OperationOutcome::Completed)
        },
        Err(RunError::Cancelled) => Ok(OperationOutcome::Cancelled),
        Err(RunError::Failed(e)) => Err(OperationError::Restore(e)),
    }
}
