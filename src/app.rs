//! Top-level sequencing.
//!
//! ```text
//! operation? ─► explicit restore dir ok? ─► telemetry ─► version check ─► login ─► backup | restore
//! ```
//!
//! Every stage can end the run early.  [`exit_code`] turns the result into
//! the process exit status: completion, a declined confirmation and
//! cancellation all exit `0`; any fatal error exits `1`.

use std::{path::Path, process::ExitCode};

use thiserror::Error;

use crate::{
    cli::{Operation, Options},
    commands::{self, Context, OperationError, OperationOutcome},
    disk::DiskSpace,
    login::{LoginError, LoginFlow, LoginOutcome},
    prompt::{PromptError, Prompter, ask_until},
    runner::{RunError, TaskRunner},
    session::{Session, SessionError, VersionStatus},
    task::Step,
    ui,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Login(#[from] LoginError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AppError {
    /// The service refused this version of the tool, at any stage.
    pub fn is_kill_switch(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::KillSwitch(_))
                | Self::Login(LoginError::Session(SessionError::KillSwitch(_)))
                | Self::Operation(
                    OperationError::Session(SessionError::KillSwitch(_))
                        | OperationError::Backup(SessionError::KillSwitch(_))
                        | OperationError::Restore(SessionError::KillSwitch(_))
                )
        )
    }
}

/// Collaborators for one run of the program.
pub struct App<'a> {
    pub session: &'a dyn Session,
    pub prompter: &'a mut dyn Prompter,
    pub runner: &'a TaskRunner,
    pub disks: &'a dyn DiskSpace,
    pub output_dir: &'a Path,
}

impl App<'_> {
    pub fn run(&mut self, options: &Options) -> Result<OperationOutcome, AppError> {
        let operation = match options.operation {
            Some(op) => op,
            None => match choose_operation(self.prompter) {
                Ok(op) => op,
                Err(PromptError::Cancelled) => return Ok(OperationOutcome::Cancelled),
                Err(e) => return Err(e.into()),
            },
        };
        tracing::info!(%operation, "operation selected");

        // Nobody can be asked to fix a directory that came from a flag or the
        // environment, so reject it before the user goes through login.
        if operation == Operation::Restore {
            if let Some(dir) = &options.dir {
                commands::restore::validate_backup_dir(dir)?;
            }
        }

        self.session.send_process_start_telemetry(options.from_env);

        if !self.check_version()? {
            return Ok(OperationOutcome::Cancelled);
        }

        let login = LoginFlow::new(self.session, self.prompter, self.runner, options.credentials.clone()).run()?;
        if login == LoginOutcome::Cancelled || self.runner.state().should_quit() {
            tracing::info!("login cancelled");
            return Ok(OperationOutcome::Cancelled);
        }

        let mut ctx = Context {
            session: self.session,
            prompter: self.prompter,
            runner: self.runner,
            disks: self.disks,
            output_dir: self.output_dir,
        };
        let outcome = match operation {
            Operation::Backup => commands::backup::run(&mut ctx, options.dir.as_deref())?,
            Operation::Restore => commands::restore::run(&mut ctx, options.dir.as_deref())?,
        };
        tracing::info!(?outcome, "operation ended");
        Ok(outcome)
    }

    /// `Ok(false)` if cancelled.  Only the kill switch is fatal.
    fn check_version(&self) -> Result<bool, AppError> {
        let session = self.session;
        let step = Step::new("Checking for updates", || session.check_version());
        match self.runner.run(&step) {
            Ok(VersionStatus::UpToDate) => Ok(true),
            Ok(VersionStatus::UpdateAvailable { latest, url }) => {
                ui::print_notice(&format!("A new version ({latest}) is available at {url}"));
                Ok(true)
            },
            Err(RunError::Cancelled) => Ok(false),
            Err(RunError::Failed(e @ SessionError::KillSwitch(_))) => Err(e.into()),
            Err(RunError::Failed(e)) => {
                tracing::warn!(error = %e, "version check failed");
                Ok(true)
            },
        }
    }
}

/// Ask for the operation until a known one is given.
pub fn choose_operation(prompter: &mut dyn Prompter) -> Result<Operation, PromptError> {
    ask_until(prompter, "Operation (backup/restore)", Prompter::ask, |answer| {
        Operation::from_answer(answer).ok_or_else(|| format!("Unknown operation '{answer}'"))
    })
}

/// Log, print and forward a fatal error.
pub fn report_error(session: Option<&dyn Session>, err: &AppError) {
    tracing::error!(error = %err, "fatal error");
    if err.is_kill_switch() {
        ui::print_error("This version of the tool is no longer supported. Please download the latest release.");
    } else {
        ui::print_error(&err.to_string());
    }
    if let Some(session) = session {
        session.report_error(&err.to_string());
    }
}

/// Process exit status for a finished run.
pub fn exit_status(result: &Result<OperationOutcome, AppError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

pub fn exit_code(result: &Result<OperationOutcome, AppError>) -> ExitCode {
    ExitCode::from(exit_status(result))
}
