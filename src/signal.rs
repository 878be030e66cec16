//! Cancellation and network status shared between threads.
//!
//! # Lifecycle
//!
//! The process owns exactly one [`QuitSignal`] ([`QuitSignal::process`]).
//! It starts out `false`, is flipped to `true` by the Ctrl+C handler (or by
//! a prompt that sees its input stream close) and is never reset.  Every
//! suspension point reads it: the task runner's poll loop and the prompt
//! layer's wait loop both go through [`wait_for`].
//!
//! [`NetworkStatus`] is the second and last piece of state that crosses
//! threads.  The session façade flips it from its own thread; everything else
//! only reads it to decide what to display.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use crate::session::NetworkCallback;

/// How often blocked waits re-check the quit signal.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ─── Quit signal ──────────────────────────────────────────────────────────────

/// Set-once, read-many cancellation flag.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal(Arc<QuitFlags>);

#[derive(Debug, Default)]
struct QuitFlags {
    requested: AtomicBool,
    acknowledged: AtomicBool,
}

static PROCESS_QUIT: OnceLock<QuitSignal> = OnceLock::new();

impl QuitSignal {
    /// A fresh, independent signal.  Used by tests and embedders that do not
    /// want to share the process-wide flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide signal that the Ctrl+C handler writes to.
    pub fn process() -> Self {
        PROCESS_QUIT.get_or_init(Self::new).clone()
    }

    /// Request cancellation.  Idempotent; lock-free; never allocates.
    pub fn request(&self) {
        self.0.requested.store(true, Ordering::SeqCst);
    }

    /// `true` once [`request`](Self::request) has been called on any clone.
    pub fn is_requested(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    /// `true` for exactly one caller after a request: whoever gets it prints
    /// the acknowledgement.
    pub fn acknowledge(&self) -> bool {
        self.is_requested() && !self.0.acknowledged.swap(true, Ordering::SeqCst)
    }
}

/// Route Ctrl+C into `signal`.
///
/// The handler only performs the atomic store; the acknowledgement message is
/// printed by whichever wait loop notices the flag first.
pub fn install_handler(signal: &QuitSignal) -> Result<(), ctrlc::Error> {
    let signal = signal.clone();
    ctrlc::set_handler(move || signal.request())
}

// ─── Network status ───────────────────────────────────────────────────────────

/// Reachability flag maintained by the session façade.
#[derive(Debug, Clone, Default)]
pub struct NetworkStatus(Arc<AtomicBool>);

impl NetworkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lost(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl NetworkCallback for NetworkStatus {
    fn on_network_lost(&self) {
        if !self.0.swap(true, Ordering::Relaxed) {
            tracing::warn!("network connection lost");
        }
    }

    fn on_network_restored(&self) {
        if self.0.swap(false, Ordering::Relaxed) {
            tracing::info!("network connection restored");
        }
    }
}

// ─── App state ────────────────────────────────────────────────────────────────

/// Read-only view over the two cross-thread flags.
///
/// Orchestrators and the task runner hold one of these; none of them ever
/// writes through it.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    quit: QuitSignal,
    network: NetworkStatus,
}

impl AppState {
    pub fn new(quit: QuitSignal, network: NetworkStatus) -> Self {
        Self { quit, network }
    }

    pub fn should_quit(&self) -> bool {
        self.quit.is_requested()
    }

    pub fn network_lost(&self) -> bool {
        self.network.is_lost()
    }

    /// The underlying signal, for wait loops that need to block on it.
    pub fn quit_signal(&self) -> &QuitSignal {
        &self.quit
    }
}

// ─── Cancellable wait ─────────────────────────────────────────────────────────

/// Result of [`wait_for`].
#[derive(Debug, PartialEq, Eq)]
pub enum Wait<T> {
    /// The sender delivered a value.
    Ready(T),
    /// The quit signal fired before a value arrived.
    Quit,
    /// Every sender was dropped without delivering a value.
    Closed,
}

/// Block on `rx` in [`POLL_INTERVAL`] slices, giving up as soon as `quit`
/// is requested.
///
/// `on_tick` runs once per slice on the calling thread; the task runner uses
/// it to redraw progress.
pub fn wait_for<T>(rx: &Receiver<T>, quit: &QuitSignal, mut on_tick: impl FnMut()) -> Wait<T> {
    loop {
        if quit.is_requested() {
            return Wait::Quit;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Wait::Ready(value),
            Err(RecvTimeoutError::Timeout) => on_tick(),
            Err(RecvTimeoutError::Disconnected) => return Wait::Closed,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread};

    use super::*;

    // ── QuitSignal ───────────────────────────────────────────────────────────

    #[test]
    fn new_signal_is_clear() {
        assert!(!QuitSignal::new().is_requested());
    }

    #[test]
    fn request_is_visible_through_clones() {
        let a = QuitSignal::new();
        let b = a.clone();
        a.request();
        assert!(b.is_requested());
    }

    #[test]
    fn request_is_idempotent() {
        let q = QuitSignal::new();
        q.request();
        q.request();
        assert!(q.is_requested());
    }

    #[test]
    fn acknowledge_fires_once_after_request() {
        let q = QuitSignal::new();
        assert!(!q.acknowledge());
        q.request();
        assert!(q.acknowledge());
        assert!(!q.clone().acknowledge());
    }

    #[test]
    fn independent_signals_do_not_interfere() {
        let a = QuitSignal::new();
        let b = QuitSignal::new();
        a.request();
        assert!(!b.is_requested());
    }

    // ── NetworkStatus ────────────────────────────────────────────────────────

    #[test]
    fn network_status_follows_callbacks() {
        let status = NetworkStatus::new();
        let state = AppState::new(QuitSignal::new(), status.clone());
        assert!(!state.network_lost());

        status.on_network_lost();
        assert!(state.network_lost());

        status.on_network_restored();
        assert!(!state.network_lost());
    }

    // ── wait_for ─────────────────────────────────────────────────────────────

    #[test]
    fn wait_for_returns_value() {
        let (tx, rx) = mpsc::channel();
        tx.send(7).unwrap();
        assert_eq!(wait_for(&rx, &QuitSignal::new(), || {}), Wait::Ready(7));
    }

    #[test]
    fn wait_for_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<u8>();
        drop(tx);
        assert_eq!(wait_for(&rx, &QuitSignal::new(), || {}), Wait::Closed);
    }

    #[test]
    fn wait_for_stops_on_quit() {
        let (_tx, rx) = mpsc::channel::<u8>();
        let quit = QuitSignal::new();
        let remote = quit.clone();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            remote.request();
        });
        assert_eq!(wait_for(&rx, &quit, || {}), Wait::Quit);
        setter.join().unwrap();
    }

    #[test]
    fn wait_for_ticks_while_waiting() {
        let (tx, rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(250));
            tx.send(()).unwrap();
        });
        let mut ticks = 0;
        assert_eq!(wait_for(&rx, &QuitSignal::new(), || ticks += 1), Wait::Ready(()));
        assert!(ticks >= 1);
        sender.join().unwrap();
    }
}
