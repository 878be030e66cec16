//! Login orchestrator — drives [`LoginState`] to `LoggedIn`.
//!
//! # Transitions
//!
//! | State                     | Input                 | Façade call(s)                                   |
//! |---------------------------|-----------------------|--------------------------------------------------|
//! | `LoggedOut`               | username, password    | `login`                                          |
//! | `AwaitingTotp`            | TOTP code             | `login_totp`                                     |
//! | `AwaitingHv`              | browser challenge     | `hv_solve_url`, confirm, `mark_hv_solved` (+ `login` replay) |
//! | `AwaitingMailboxPassword` | mailbox password      | `login_mailbox_password`                         |
//!
//! Every façade call goes through the [`TaskRunner`], one at a time.
//!
//! # Retry policy
//!
//! A step that fails with a recoverable [`SessionError`] (or returns the state
//! it started from) counts as a failed attempt for the current state.  The
//! [`RetryCounter`] is cleared whenever a step moves the machine to a different
//! state.  The third consecutive failure in one state is fatal.
//!
//! Credentials passed on the command line or through the environment are used
//! instead of prompting, every time they are needed.

use thiserror::Error;

use crate::{
    prompt::{PromptError, Prompter},
    runner::{RunError, TaskRunner},
    session::{LoginState, Session, SessionError},
    task::Step,
    ui,
};

/// Consecutive failed attempts allowed in one state.
pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

// ─── Inputs / outputs ─────────────────────────────────────────────────────────

/// Login inputs supplied up front (flags or environment).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
    pub mailbox_password: Option<String>,
    pub totp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    /// The user asked to quit before login completed.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("max attempts reached while {state}: {reason}")]
    MaxAttempts { state: LoginState, reason: String },

    #[error("login is not making progress (stuck {state})")]
    NoProgress { state: LoginState },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

// ─── Retry counter ────────────────────────────────────────────────────────────

/// Consecutive failures of the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    state: LoginState,
    failures: u32,
    max: u32,
}

impl RetryCounter {
    pub const fn new(max: u32) -> Self {
        Self {
            state: LoginState::LoggedOut,
            failures: 0,
            max,
        }
    }

    /// Record a failed attempt in `state`, returning the running count.
    pub fn record_failure(&mut self, state: LoginState) -> u32 {
        if state != self.state {
            self.state = state;
            self.failures = 0;
        }
        self.failures += 1;
        self.failures
    }

    /// Forget previous failures; `state` is the one just entered.
    pub fn reset(&mut self, state: LoginState) {
        self.state = state;
        self.failures = 0;
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }

    pub const fn is_exhausted(&self) -> bool {
        self.failures >= self.max
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

/// What one step did.
enum Attempt {
    Advanced(LoginState),
    Failed(String),
    Cancelled,
}

/// One login run.  Owns nothing but its bookkeeping; the session, prompter
/// and runner are borrowed from the caller.
pub struct LoginFlow<'a> {
    session: &'a dyn Session,
    prompter: &'a mut dyn Prompter,
    runner: &'a TaskRunner,
    credentials: Credentials,
    /// Last username/password submitted, replayed after human verification.
    last_login: Option<(String, String)>,
    retries: RetryCounter,
    visited: Vec<LoginState>,
    attempts: u32,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        session: &'a dyn Session,
        prompter: &'a mut dyn Prompter,
        runner: &'a TaskRunner,
        credentials: Credentials,
    ) -> Self {
        Self {
            session,
            prompter,
            runner,
            credentials,
            last_login: None,
            retries: RetryCounter::new(MAX_LOGIN_ATTEMPTS),
            visited: Vec::new(),
            attempts: 0,
        }
    }

    /// States entered so far, in order, starting with `LoggedOut`.
    pub fn visited(&self) -> &[LoginState] {
        &self.visited
    }

    /// Steps attempted so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drive the machine until `LoggedIn`, cancellation or a fatal error.
    pub fn run(&mut self) -> Result<LoginOutcome, LoginError> {
        let mut state = LoginState::LoggedOut;
        self.retries.reset(state);
        self.visited.push(state);

        while state != LoginState::LoggedIn {
            if self.quit_requested() {
                return Ok(LoginOutcome::Cancelled);
            }
            if self.attempts >= MAX_LOGIN_ATTEMPTS * self.distinct_visited() {
                return Err(LoginError::NoProgress { state });
            }

            self.attempts += 1;
            let reason = match self.step(state)? {
                Attempt::Cancelled => return Ok(LoginOutcome::Cancelled),
                Attempt::Advanced(next) if next != state => {
                    tracing::info!(from = %state, to = %next, "login state advanced");
                    state = next;
                    self.retries.reset(state);
                    self.visited.push(state);
                    continue;
                },
                Attempt::Advanced(_) => format!("still {state}"),
                Attempt::Failed(reason) => reason,
            };

            let failures = self.retries.record_failure(state);
            tracing::warn!(%state, failures, %reason, "login step failed");
            if self.retries.is_exhausted() {
                tracing::error!(%state, "max login attempts reached");
                return Err(LoginError::MaxAttempts { state, reason });
            }
            ui::print_error(&format!(
                "{reason} (attempt {failures} of {MAX_LOGIN_ATTEMPTS})"
            ));
        }

        tracing::info!(attempts = self.attempts, "logged in");
        Ok(LoginOutcome::LoggedIn)
    }

    fn distinct_visited(&self) -> u32 {
        let mut seen: Vec<LoginState> = Vec::with_capacity(self.visited.len());
        for s in &self.visited {
            if !seen.contains(s) {
                seen.push(*s);
            }
        }
        seen.len() as u32
    }

    fn quit_requested(&self) -> bool {
        self.runner.state().should_quit()
    }

    fn step(&mut self, state: LoginState) -> Result<Attempt, LoginError> {
        match state {
            LoginState::LoggedOut => self.step_credentials(),
            LoginState::AwaitingTotp => {
                let Some(code) = self.input(self.credentials.totp.clone(), "TOTP Code", true)? else {
                    return Ok(Attempt::Cancelled);
                };
                self.submit("Submitting TOTP", || self.session.login_totp(&code))
            },
            LoginState::AwaitingHv => self.step_human_verification(),
            LoginState::AwaitingMailboxPassword => {
                let provided = self.credentials.mailbox_password.clone();
                let Some(password) = self.input(provided, "Mailbox Password", true)? else {
                    return Ok(Attempt::Cancelled);
                };
                self.submit("Unlocking mailbox", || {
                    self.session.login_mailbox_password(&password)
                })
            },
            LoginState::LoggedIn => Ok(Attempt::Advanced(LoginState::LoggedIn)),
        }
    }

    fn step_credentials(&mut self) -> Result<Attempt, LoginError> {
        let Some(email) = self.input(self.credentials.email.clone(), "Username", false)? else {
            return Ok(Attempt::Cancelled);
        };
        let Some(password) = self.input(self.credentials.password.clone(), "Password", true)?
        else {
            return Ok(Attempt::Cancelled);
        };
        self.last_login = Some((email.clone(), password.clone()));
        self.submit("Performing Login", || self.session.login(&email, &password))
    }

    fn step_human_verification(&mut self) -> Result<Attempt, LoginError> {
        let url = match self.runner.run(&Step::new("Requesting verification link", || {
            self.session.hv_solve_url()
        })) {
            Ok(url) => url,
            Err(err) => return session_failure(err),
        };

        ui::print_notice("Human verification is required to continue.");
        ui::print_notice(&format!("Open {url} in a browser and complete the challenge."));

        if self.quit_requested() {
            return Ok(Attempt::Cancelled);
        }
        match self.prompter.confirm("Have you completed the verification?") {
            Ok(true) => {},
            Ok(false) => return Ok(Attempt::Failed("human verification not completed".into())),
            Err(PromptError::Cancelled) => return Ok(Attempt::Cancelled),
            Err(e) => return Err(e.into()),
        }

        let attempt = self.submit("Checking verification", || self.session.mark_hv_solved())?;
        match (attempt, self.last_login.clone()) {
            (Attempt::Advanced(LoginState::LoggedOut), Some((email, password))) => {
                tracing::info!("verification accepted, replaying login");
                self.submit("Performing Login", || self.session.login(&email, &password))
            },
            (attempt, _) => Ok(attempt),
        }
    }

    /// `provided` if set, otherwise ask.  `None` means cancelled.
    fn input(
        &mut self,
        provided: Option<String>,
        label: &str,
        secret: bool,
    ) -> Result<Option<String>, LoginError> {
        if self.quit_requested() {
            return Ok(None);
        }
        if provided.is_some() {
            return Ok(provided);
        }
        let answer = if secret {
            self.prompter.read_secret(label)
        } else {
            self.prompter.read_text(label)
        };
        match answer {
            Ok(value) => Ok(Some(value)),
            Err(PromptError::Cancelled) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Run one façade call behind a spinner.
    fn submit<F>(&self, label: &str, call: F) -> Result<Attempt, LoginError>
    where
        F: Fn() -> Result<LoginState, SessionError> + Sync,
    {
        let session = self.session;
        let step = Step::new(label, call).on_cancel(move || session.cancel());
        match self.runner.run(&step) {
            // The step finished, but cancellation came in while it ran.
            Ok(_) if self.quit_requested() => Ok(Attempt::Cancelled),
            Ok(next) => Ok(Attempt::Advanced(next)),
            Err(err) => session_failure(err),
        }
    }
}

/// Classify a failed façade call.
fn session_failure(err: RunError<SessionError>) -> Result<Attempt, LoginError> {
    match err {
        RunError::Cancelled | RunError::Failed(SessionError::Cancelled) => Ok(Attempt::Cancelled),
        RunError::Failed(e) if e.is_recoverable() => Ok(Attempt::Failed(e.to_string())),
        RunError::Failed(e) => Err(e.into()),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
