//! `backup` — export the account's mail to a local directory.
//!
//! # Flow
//!
//! 1. Resolve the export directory (explicit path → default path → prompt).
//! 2. Estimate how much space the export needs.
//! 3. Ask for confirmation if that exceeds the free space on the target disk.
//! 4. Run the export behind a percentage bar.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    commands::{Context, OperationError, OperationOutcome, resolve_under},
    disk::{BackupPrecondition, DiskSpace},
    prompt::{PromptError, Prompter, ask_until},
    runner::RunError,
    session::{Backup, SessionError},
    task::{Progress, ProgressKind, Step, Task},
    ui,
};

/// Where the export goes, and whether it is the default location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDir {
    pub path: PathBuf,
    pub is_default: bool,
}

/// Pick and create the export directory.
///
/// - An explicit path is used as-is (relative paths under `output_dir`); failing to create it is fatal.
/// - Otherwise `<output_dir>/<email>` is offered; declining it, or failing to create it, falls through to a
///   prompt for a custom path, re-asked up to [`MAX_INPUT_ATTEMPTS`](crate::prompt::MAX_INPUT_ATTEMPTS) times.
pub fn resolve_export_dir(
    prompter: &mut dyn Prompter,
    output_dir: &Path,
    explicit: Option<&Path>,
    email: &str,
) -> Result<ExportDir, OperationError> {
    if let Some(path) = explicit {
        let path = resolve_under(output_dir, path);
        fs::create_dir_all(&path).map_err(|source| OperationError::CreateDir {
            path: path.clone(),
            source,
        })?;
        return Ok(ExportDir {
            path,
            is_default: false,
        });
    }

    let default = output_dir.join(email);
    if prompter.confirm(&format!("Do you want to export to the default path {}?", default.display()))? {
        match fs::create_dir_all(&default) {
            Ok(()) => {
                return Ok(ExportDir {
                    path: default,
                    is_default: true,
                });
            },
            Err(e) => ui::print_error(&format!("Failed to create {}: {e}", default.display())),
        }
    }

    let path = ask_until(prompter, "Export Path", Prompter::ask, |answer| {
        let path = resolve_under(output_dir, Path::new(answer));
        if path.exists() && !path.is_dir() {
            return Err(format!("{}: path is not a directory", path.display()));
        }
        fs::create_dir_all(&path).map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
        Ok(path)
    })?;
    Ok(ExportDir {
        path,
        is_default: false,
    })
}

/// A running export.
pub struct BackupTask<'s> {
    backup: Box<dyn Backup + 's>,
}

impl<'s> BackupTask<'s> {
    pub fn new(backup: Box<dyn Backup + 's>) -> Self {
        Self { backup }
    }

    pub fn export_path(&self) -> &Path {
        self.backup.export_path()
    }
}

impl Task for BackupTask<'_> {
    type Output = ();
    type Error = SessionError;

    fn description(&self) -> &str {
        "Exporting mail"
    }

    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::Percentage
    }

    fn run(&self, progress: &Progress) -> Result<(), SessionError> {
        self.backup.start(&|value| progress.set(value))
    }

    fn cancel(&self) {
        self.backup.cancel();
    }
}

/// Decide whether to go ahead given the space estimate.  `Ok(false)` means
/// the user declined.
fn confirm_free_space(
    prompter: &mut dyn Prompter,
    disks: &dyn DiskSpace,
    target: &Path,
    expected: u64,
) -> Result<bool, PromptError> {
    let available = match disks.available_space(target) {
        Ok(available) => available,
        Err(e) => {
            tracing::warn!(path = %target.display(), error = %e, "free space unknown, skipping check");
            ui::print_notice("Could not determine the free disk space; skipping the check.");
            return Ok(true);
        },
    };

    let pre = BackupPrecondition {
        target: target.to_path_buf(),
        expected,
        available,
    };
    tracing::info!(expected = pre.expected, available = pre.available, "disk space check");
    if !pre.needs_confirmation() {
        return Ok(true);
    }

    ui::print_notice(&format!(
        "The export may need {} but only {} is free on {}.",
        ui::format_mb(pre.expected),
        ui::format_mb(pre.available),
        pre.target.display()
    ));
    prompter.confirm("Do you wish to proceed?")
}

/// Run the backup operation for the logged-in account.
pub fn run(ctx: &mut Context<'_>, explicit_dir: Option<&Path>) -> Result<OperationOutcome, OperationError> {
    let email = ctx.session.email()?;

    let dir = match resolve_export_dir(ctx.prompter, ctx.output_dir, explicit_dir, &email) {
        Ok(dir) => dir,
        Err(e) if e.is_cancellation() => return Ok(OperationOutcome::Cancelled),
        Err(e) => return Err(e),
    };
    ctx.session.set_using_default_export_path(dir.is_default);
    tracing::info!(path = %dir.path.display(), default = dir.is_default, "export directory resolved");

    let backup = ctx.session.new_backup(&dir.path)?;

    let estimate = Step::new("Estimating export size", || backup.expected_disk_usage());
    let expected = match ctx.runner.run(&estimate) {
        Ok(bytes) => bytes,
        Err(RunError::Cancelled) => return Ok(OperationOutcome::Cancelled),
        Err(RunError::Failed(e)) => return Err(OperationError::Backup(e)),
    };
    drop(estimate);

    match confirm_free_space(ctx.prompter, ctx.disks, backup.export_path(), expected) {
        Ok(true) => {},
        Ok(false) => {
            tracing::info!("backup declined at the disk space check");
            return Ok(OperationOutcome::Declined);
        },
        Err(PromptError::Cancelled) => return Ok(OperationOutcome::Cancelled),
        Err(e) => return Err(e.into()),
    }

    if ctx.runner.state().should_quit() {
        return Ok(OperationOutcome::Cancelled);
    }

    let task = BackupTask::new(backup);
    match ctx.runner.run(&task) {
        Ok(()) => {
            tracing::info!(path = %task.export_path().display(), "export finished");
            ui::print_export_finished(task.export_path());
            Ok(OperationOutcome::Completed)
        },
        Err(RunError::Cancelled) => Ok(OperationOutcome::Cancelled),
        Err(RunError::Failed(e)) => Err(OperationError::Backup(e)),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
