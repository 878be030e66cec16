//! In-memory collaborators shared by the integration tests.
//!
//! - [`FakeSession`] answers login calls from a script and records every call.
//! - [`ScriptedPrompter`] answers prompts from a queue and records every label.
//! - [`FixedDisk`] reports a fixed amount of free space (or fails).

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::Duration,
};

use mail_export::{
    disk::DiskSpace,
    prompt::{PromptError, Prompter},
    runner::TaskRunner,
    session::{Backup, LoginState, Restore, Session, SessionError, StartupInputs, VersionStatus},
    signal::{AppState, NetworkStatus, QuitSignal},
    ui::Draw,
};

pub const MB: u64 = 1024 * 1024;

pub fn runner(quit: &QuitSignal) -> TaskRunner {
    TaskRunner::new(AppState::new(quit.clone(), NetworkStatus::new())).with_draw(Draw::Hidden)
}

/// Request `quit` after `delay`, from another thread.
pub fn quit_after(quit: &QuitSignal, delay: Duration) -> thread::JoinHandle<()> {
    let quit = quit.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        quit.request();
    })
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// What a fake backup does when started.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub expected: u64,
    pub fail_with: Option<String>,
    /// Keep running until cancelled.
    pub block: bool,
}

impl Default for BackupPlan {
    fn default() -> Self {
        Self {
            expected: 10 * MB,
            fail_with: None,
            block: false,
        }
    }
}

/// What a fake restore does when started.
#[derive(Debug, Clone, Default)]
pub struct RestorePlan {
    pub importable: u64,
    pub imported: u64,
    pub failed: u64,
    pub fail_with: Option<String>,
    pub block: bool,
}

pub struct FakeSession {
    script: Mutex<VecDeque<Result<LoginState, SessionError>>>,
    version: Mutex<Option<Result<VersionStatus, SessionError>>>,
    calls: Mutex<Vec<String>>,
    quit_during: Mutex<Option<(&'static str, QuitSignal)>>,
    pub email: String,
    pub backup: BackupPlan,
    pub restore: RestorePlan,
    pub progress: Mutex<Vec<f32>>,
    pub telemetry: Mutex<Vec<StartupInputs>>,
    pub default_path: Mutex<Option<bool>>,
    pub reported: Mutex<Vec<String>>,
    pub login_cancels: AtomicU32,
    pub operation_cancels: AtomicU32,
    pub operation_finished: AtomicBool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            version: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            quit_during: Mutex::new(None),
            email: "alice@example.com".into(),
            backup: BackupPlan::default(),
            restore: RestorePlan::default(),
            progress: Mutex::new(Vec::new()),
            telemetry: Mutex::new(Vec::new()),
            default_path: Mutex::new(None),
            reported: Mutex::new(Vec::new()),
            login_cancels: AtomicU32::new(0),
            operation_cancels: AtomicU32::new(0),
            operation_finished: AtomicBool::new(false),
        }
    }

    /// Results returned, in order, by the login-family calls.
    pub fn script(self, steps: impl IntoIterator<Item = Result<LoginState, SessionError>>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    /// Request `quit` while `call` is in flight, then let the call finish
    /// with its scripted result.
    pub fn quit_during(self, call: &'static str, quit: &QuitSignal) -> Self {
        *self.quit_during.lock().unwrap() = Some((call, quit.clone()));
        self
    }

    pub fn version(self, status: Result<VersionStatus, SessionError>) -> Self {
        *self.version.lock().unwrap() = Some(status);
        self
    }

    pub fn with_backup(mut self, plan: BackupPlan) -> Self {
        self.backup = plan;
        self
    }

    pub fn with_restore(mut self, plan: RestorePlan) -> Self {
        self.restore = plan;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn next_state(&self, call: &str) -> Result<LoginState, SessionError> {
        self.record(call);
        if let Some((_, quit)) = self.quit_during.lock().unwrap().as_ref().filter(|(name, _)| *name == call) {
            quit.request();
            thread::sleep(Duration::from_millis(250));
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Protocol(format!("unexpected {call}"))))
    }

    fn run_operation(&self, cancelled: &AtomicBool, block: bool, fail_with: Option<&String>, on_progress: &dyn Fn(f32)) -> Result<(), SessionError> {
        on_progress(0.5);
        self.progress.lock().unwrap().push(0.5);
        if block {
            while !cancelled.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(50));
            self.operation_finished.store(true, Ordering::SeqCst);
            return Err(SessionError::Cancelled);
        }
        if let Some(reason) = fail_with {
            return Err(SessionError::Protocol(reason.clone()));
        }
        on_progress(1.0);
        self.progress.lock().unwrap().push(1.0);
        self.operation_finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Session for FakeSession {
    fn login(&self, _email: &str, _password: &str) -> Result<LoginState, SessionError> {
        self.next_state("login")
    }

    fn login_totp(&self, _code: &str) -> Result<LoginState, SessionError> {
        self.next_state("login_totp")
    }

    fn login_mailbox_password(&self, _password: &str) -> Result<LoginState, SessionError> {
        self.next_state("login_mailbox_password")
    }

    fn mark_hv_solved(&self) -> Result<LoginState, SessionError> {
        self.next_state("mark_hv_solved")
    }

    fn hv_solve_url(&self) -> Result<String, SessionError> {
        self.record("hv_solve_url");
        Ok("https://verify.example.com/challenge".into())
    }

    fn email(&self) -> Result<String, SessionError> {
        Ok(self.email.clone())
    }

    fn check_version(&self) -> Result<VersionStatus, SessionError> {
        self.record("check_version");
        self.version.lock().unwrap().take().unwrap_or(Ok(VersionStatus::UpToDate))
    }

    fn new_backup(&self, export_path: &Path) -> Result<Box<dyn Backup + '_>, SessionError> {
        self.record("new_backup");
        Ok(Box::new(FakeBackup {
            session: self,
            path: export_path.to_path_buf(),
            cancelled: AtomicBool::new(false),
        }))
    }

    fn new_restore(&self, backup_path: &Path) -> Result<Box<dyn Restore + '_>, SessionError> {
        self.record("new_restore");
        Ok(Box::new(FakeRestore {
            session: self,
            path: backup_path.to_path_buf(),
            cancelled: AtomicBool::new(false),
        }))
    }

    fn cancel(&self) {
        self.login_cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn set_using_default_export_path(&self, using_default: bool) {
        *self.default_path.lock().unwrap() = Some(using_default);
    }

    fn send_process_start_telemetry(&self, inputs: StartupInputs) {
        self.record("telemetry");
        self.telemetry.lock().unwrap().push(inputs);
    }

    fn report_error(&self, message: &str) {
        self.reported.lock().unwrap().push(message.to_string());
    }
}

struct FakeBackup<'s> {
    session: &'s FakeSession,
    path: PathBuf,
    cancelled: AtomicBool,
}

impl Backup for FakeBackup<'_> {
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError> {
        self.session.record("backup_start");
        let plan = &self.session.backup;
        self.session
            .run_operation(&self.cancelled, plan.block, plan.fail_with.as_ref(), on_progress)
    }

    fn cancel(&self) {
        self.session.operation_cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn export_path(&self) -> &Path {
        &self.path
    }

    fn expected_disk_usage(&self) -> Result<u64, SessionError> {
        Ok(self.session.backup.expected)
    }
}

struct FakeRestore<'s> {
    session: &'s FakeSession,
    path: PathBuf,
    cancelled: AtomicBool,
}

impl Restore for FakeRestore<'_> {
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError> {
        self.session.record("restore_start");
        let plan = &self.session.restore;
        self.session
            .run_operation(&self.cancelled, plan.block, plan.fail_with.as_ref(), on_progress)
    }

    fn cancel(&self) {
        self.session.operation_cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn backup_path(&self) -> &Path {
        &self.path
    }

    fn importable_count(&self) -> u64 {
        self.session.restore.importable
    }

    fn imported_count(&self) -> u64 {
        self.session.restore.imported
    }

    fn failed_count(&self) -> u64 {
        self.session.restore.failed
    }

    fn skipped_count(&self) -> u64 {
        let r = &self.session.restore;
        r.importable - r.imported - r.failed
    }
}

// ─── Prompter ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Answer {
    Text(&'static str),
    Yes,
    No,
    Path(PathBuf),
    /// Request the quit signal and fail the prompt as cancelled.
    Quit,
}

/// Answers prompts in order.  Running out of answers counts as a closed
/// input stream.
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    quit: QuitSignal,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(quit: &QuitSignal, answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            quit: quit.clone(),
            asked: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, label: &str) -> Result<Answer, PromptError> {
        self.asked.push(label.to_string());
        match self.answers.pop_front() {
            Some(Answer::Quit) | None => {
                self.quit.request();
                Err(PromptError::Cancelled)
            },
            Some(answer) => Ok(answer),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, label: &str) -> Result<String, PromptError> {
        match self.next(label)? {
            Answer::Text(text) => Ok(text.to_string()),
            Answer::Path(path) => Ok(path.display().to_string()),
            other => panic!("prompt '{label}' expected text, script has {other:?}"),
        }
    }

    fn ask_secret(&mut self, label: &str) -> Result<String, PromptError> {
        self.ask(label)
    }

    fn confirm(&mut self, label: &str) -> Result<bool, PromptError> {
        match self.next(label)? {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            other => panic!("prompt '{label}' expected yes/no, script has {other:?}"),
        }
    }
}

// ─── Disk ────────────────────────────────────────────────────────────────────

/// `Some(bytes)` free everywhere, or `None` to fail every probe.
pub struct FixedDisk(pub Option<u64>);

impl DiskSpace for FixedDisk {
    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        self.0.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such disk"))
    }
}
