//! HTTP/JSON implementation of the session façade.
//!
//! # Endpoints
//!
//! | Method | Path                   | Used by                           |
//! |--------|------------------------|-----------------------------------|
//! | POST   | `/auth/login`          | [`Session::login`]                |
//! | POST   | `/auth/2fa`            | [`Session::login_totp`]           |
//! | POST   | `/auth/mailbox`        | [`Session::login_mailbox_password`] |
//! | GET    | `/auth/hv`             | [`Session::hv_solve_url`]         |
//! | POST   | `/auth/hv/solved`      | [`Session::mark_hv_solved`]       |
//! | GET    | `/version`             | [`Session::check_version`]        |
//! | GET    | `/mail/messages`       | backup listing and size estimate  |
//! | GET    | `/mail/messages/{id}`  | backup download (raw `.eml`)      |
//! | POST   | `/mail/import`         | restore upload (raw `.eml`)       |
//! | POST   | `/telemetry/{event}`   | telemetry, unless disabled        |
//! | POST   | `/errors`              | [`Session::report_error`]         |
//!
//! Status mapping: `410 Gone` is the kill switch, other `4xx` are protocol
//! errors, `5xx` and transport failures are network errors.  A request that
//! gets no response at all also flips the [`NetworkCallback`].

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Local};
use regex::Regex;
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::CONTENT_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::session::{
    Backup, LoginState, NetworkCallback, Restore, Session, SessionError, StartupInputs, VersionStatus,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Name of the per-run folder a backup writes into.
const BACKUP_FOLDER_PATTERN: &str = r"^mail_\d{8}_\d{6}$";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireState {
    LoggedOut,
    AwaitingTotp,
    AwaitingHv,
    AwaitingMailboxPassword,
    LoggedIn,
}

impl From<WireState> for LoginState {
    fn from(state: WireState) -> Self {
        match state {
            WireState::LoggedOut => Self::LoggedOut,
            WireState::AwaitingTotp => Self::AwaitingTotp,
            WireState::AwaitingHv => Self::AwaitingHv,
            WireState::AwaitingMailboxPassword => Self::AwaitingMailboxPassword,
            WireState::LoggedIn => Self::LoggedIn,
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CodeRequest<'a> {
    code: &'a str,
}

#[derive(Serialize)]
struct PasswordRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    state: WireState,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HvChallenge {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    latest: String,
    download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageList {
    ids: Vec<String>,
    total_size: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ─── Session ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Auth {
    token: Option<String>,
    email: Option<String>,
}

/// [`Session`] over the account service's HTTP API.
pub struct RemoteSession {
    client: Client,
    base_url: String,
    network: Arc<dyn NetworkCallback>,
    telemetry: bool,
    auth: Mutex<Auth>,
}

impl RemoteSession {
    pub fn new(base_url: &str, network: Arc<dyn NetworkCallback>, telemetry: bool) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mail-export/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
            telemetry,
            auth: Mutex::new(Auth::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth(&self) -> std::sync::MutexGuard<'_, Auth> {
        self.auth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth().token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send `req`, keeping the network status callback in sync.
    fn send(&self, req: RequestBuilder) -> Result<Response, SessionError> {
        match self.authorized(req).send() {
            Ok(resp) => {
                self.network.on_network_restored();
                check_status(resp)
            },
            Err(e) if e.is_builder() => Err(SessionError::Protocol(e.to_string())),
            Err(e) => {
                self.network.on_network_lost();
                Err(SessionError::Network(e.to_string()))
            },
        }
    }

    fn send_json<T: for<'de> Deserialize<'de>>(&self, req: RequestBuilder) -> Result<T, SessionError> {
        self.send(req)?
            .json()
            .map_err(|e| SessionError::Protocol(format!("unexpected response: {e}")))
    }

    fn advance(&self, req: RequestBuilder) -> Result<LoginState, SessionError> {
        let resp: StateResponse = self.send_json(req)?;
        if let Some(token) = resp.token {
            self.auth().token = Some(token);
        }
        let state = LoginState::from(resp.state);
        tracing::debug!(%state, "login state from service");
        Ok(state)
    }

    fn telemetry_event(&self, event: &str, body: &serde_json::Value) {
        if !self.telemetry {
            return;
        }
        let req = self.client.post(self.url(&format!("/telemetry/{event}"))).json(body);
        if let Err(e) = self.send(req) {
            tracing::debug!(event, error = %e, "telemetry not sent");
        }
    }

    fn list_messages(&self) -> Result<MessageList, SessionError> {
        self.send_json(self.client.get(self.url("/mail/messages")))
    }
}

impl Session for RemoteSession {
    fn login(&self, email: &str, password: &str) -> Result<LoginState, SessionError> {
        let req = self.client.post(self.url("/auth/login")).json(&LoginRequest { email, password });
        let state = self.advance(req)?;
        self.auth().email = Some(email.to_string());
        Ok(state)
    }

    fn login_totp(&self, code: &str) -> Result<LoginState, SessionError> {
        self.advance(self.client.post(self.url("/auth/2fa")).json(&CodeRequest { code }))
    }

    fn login_mailbox_password(&self, password: &str) -> Result<LoginState, SessionError> {
        self.advance(self.client.post(self.url("/auth/mailbox")).json(&PasswordRequest { password }))
    }

    fn mark_hv_solved(&self) -> Result<LoginState, SessionError> {
        self.advance(self.client.post(self.url("/auth/hv/solved")))
    }

    fn hv_solve_url(&self) -> Result<String, SessionError> {
        let challenge: HvChallenge = self.send_json(self.client.get(self.url("/auth/hv")))?;
        Ok(challenge.url)
    }

    fn email(&self) -> Result<String, SessionError> {
        self.auth()
            .email
            .clone()
            .ok_or_else(|| SessionError::Protocol("not logged in".into()))
    }

    fn check_version(&self) -> Result<VersionStatus, SessionError> {
        let resp: VersionResponse = self.send_json(self.client.get(self.url("/version")))?;
        Ok(version_status(env!("CARGO_PKG_VERSION"), resp))
    }

    fn new_backup(&self, export_path: &Path) -> Result<Box<dyn Backup + '_>, SessionError> {
        Ok(Box::new(RemoteBackup {
            session: self,
            export_path: export_path.to_path_buf(),
            cancelled: AtomicBool::new(false),
            listing: Mutex::new(None),
        }))
    }

    fn new_restore(&self, backup_path: &Path) -> Result<Box<dyn Restore + '_>, SessionError> {
        Ok(Box::new(RemoteRestore {
            session: self,
            backup_path: backup_path.to_path_buf(),
            cancelled: AtomicBool::new(false),
            importable: AtomicU64::new(0),
            imported: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }))
    }

    fn set_using_default_export_path(&self, using_default: bool) {
        self.telemetry_event("export_path", &json!({ "using_default": using_default }));
    }

    fn send_process_start_telemetry(&self, inputs: StartupInputs) {
        self.telemetry_event(
            "process_start",
            &json!({
                "operation_from_env": inputs.operation,
                "dir_from_env": inputs.dir,
                "password_from_env": inputs.password,
                "mailbox_password_from_env": inputs.mailbox_password,
                "totp_from_env": inputs.totp,
                "email_from_env": inputs.email,
            }),
        );
    }

    fn report_error(&self, message: &str) {
        self.telemetry_event("error", &json!({ "message": message }));
    }
}

// ─── Backup ──────────────────────────────────────────────────────────────────

struct RemoteBackup<'s> {
    session: &'s RemoteSession,
    export_path: PathBuf,
    cancelled: AtomicBool,
    /// Fetched once by whichever of the size estimate or the export runs first.
    listing: Mutex<Option<MessageList>>,
}

impl RemoteBackup<'_> {
    fn listing(&self) -> Result<MessageList, SessionError> {
        let mut cached = self.listing.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = cached.as_ref() {
            return Ok(list.clone());
        }
        let list = self.session.list_messages()?;
        *cached = Some(list.clone());
        Ok(list)
    }
}

impl Backup for RemoteBackup<'_> {
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError> {
        let list = self.listing()?;
        let folder = self.export_path.join(backup_folder_name(Local::now()));
        fs::create_dir_all(&folder)?;
        tracing::info!(folder = %folder.display(), messages = list.ids.len(), "export started");

        let total = list.ids.len();
        for (done, id) in list.ids.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SessionError::Cancelled);
            }
            let req = self.session.client.get(self.session.url(&format!("/mail/messages/{id}")));
            let body = self
                .session
                .send(req)?
                .bytes()
                .map_err(|e| SessionError::Network(e.to_string()))?;
            fs::write(folder.join(format!("{}.eml", file_stem(id))), &body)?;
            on_progress(fraction(done + 1, total));
        }
        on_progress(1.0);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn export_path(&self) -> &Path {
        &self.export_path
    }

    fn expected_disk_usage(&self) -> Result<u64, SessionError> {
        Ok(self.listing()?.total_size)
    }
}

// ─── Restore ─────────────────────────────────────────────────────────────────

struct RemoteRestore<'s> {
    session: &'s RemoteSession,
    backup_path: PathBuf,
    cancelled: AtomicBool,
    importable: AtomicU64,
    imported: AtomicU64,
    failed: AtomicU64,
}

impl Restore for RemoteRestore<'_> {
    fn start(&self, on_progress: &dyn Fn(f32)) -> Result<(), SessionError> {
        let mut messages = Vec::new();
        for folder in find_backup_folders(&self.backup_path)? {
            messages.extend(eml_files(&folder)?);
        }
        self.importable.store(messages.len() as u64, Ordering::SeqCst);
        tracing::info!(path = %self.backup_path.display(), messages = messages.len(), "import started");

        let total = messages.len();
        for (done, path) in messages.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SessionError::Cancelled);
            }
            let body = fs::read(path)?;
            let req = self
                .session
                .client
                .post(self.session.url("/mail/import"))
                .header(CONTENT_TYPE, "message/rfc822")
                .body(body);
            match self.session.send(req) {
                Ok(_) => {
                    self.imported.fetch_add(1, Ordering::SeqCst);
                },
                Err(SessionError::Protocol(reason)) => {
                    tracing::warn!(file = %path.display(), %reason, "message rejected");
                    self.failed.fetch_add(1, Ordering::SeqCst);
                },
                Err(e) => return Err(e),
            }
            on_progress(fraction(done + 1, total));
        }
        on_progress(1.0);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn importable_count(&self) -> u64 {
        self.importable.load(Ordering::SeqCst)
    }

    fn imported_count(&self) -> u64 {
        self.imported.load(Ordering::SeqCst)
    }

    fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn skipped_count(&self) -> u64 {
        skipped(self.importable_count(), self.imported_count(), self.failed_count())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_status(resp: Response) -> Result<Response, SessionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| status.to_string());
    Err(classify_status(status.as_u16(), message))
}

/// Map a non-success HTTP status to a façade error.
fn classify_status(status: u16, message: String) -> SessionError {
    match status {
        410 => SessionError::KillSwitch(message),
        500..=599 => SessionError::Network(message),
        _ => SessionError::Protocol(message),
    }
}

fn version_status(current: &str, resp: VersionResponse) -> VersionStatus {
    if resp.latest == current {
        VersionStatus::UpToDate
    } else {
        VersionStatus::UpdateAvailable {
            latest: resp.latest,
            url: resp.download_url,
        }
    }
}

/// `mail_<YYYYMMDD>_<HHMMSS>`.
pub fn backup_folder_name(now: DateTime<Local>) -> String {
    format!("mail_{}", now.format("%Y%m%d_%H%M%S"))
}

/// Backup folders under `dir`, or `dir` itself if it is one.  Sorted.
pub fn find_backup_folders(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let pattern = Regex::new(BACKUP_FOLDER_PATTERN).map_err(io::Error::other)?;
    let matches = |p: &Path| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| pattern.is_match(n));

    if matches(dir) {
        return Ok(vec![dir.to_path_buf()]);
    }
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && matches(&path) {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}

fn eml_files(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "eml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Message ids come from the service; keep them from escaping the folder.
///
/// Ids that had to be rewritten get a short digest of the raw id appended, so
/// two ids that only differ in replaced characters stay distinct.
fn file_stem(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe == id {
        return safe;
    }
    let digest = Sha256::digest(id.as_bytes());
    let short: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("{safe}-{short}")
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 { 1.0 } else { done as f32 / total as f32 }
}

fn skipped(importable: u64, imported: u64, failed: u64) -> u64 {
    importable.saturating_sub(imported).saturating_sub(failed)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
