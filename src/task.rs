//! Units of cancellable, progress-reporting blocking work.
//!
//! A [`Task`] is shared by reference between two threads while it runs: the
//! task runner's worker calls [`Task::run`] and the main thread may call
//! [`Task::cancel`] at the same time.  Hence `&self` everywhere and the `Sync`
//! bound.
//!
//! Three task kinds exist in this crate:
//!
//! | Type                         | Progress   | Used for                        |
//! |------------------------------|------------|---------------------------------|
//! | [`Step`]                     | spinner    | login steps, version check, ... |
//! | `commands::backup::BackupTask`   | percentage | mail export                 |
//! | `commands::restore::RestoreTask` | percentage | mail import                 |

use std::sync::atomic::{AtomicU32, Ordering};

/// How the runner should render a task while it is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Indeterminate liveness indicator.
    Spinner,
    /// Percentage derived from [`Progress`].
    Percentage,
}

// ─── Progress ─────────────────────────────────────────────────────────────────

/// Progress value in `[0.0, 1.0]`, written by the worker and read by the
/// polling thread.
#[derive(Debug, Default)]
pub struct Progress(AtomicU32);

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, clamped to `[0.0, 1.0]`.  NaN is treated as `0.0`.
    pub fn set(&self, value: f32) {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Whole percent, `0..=100`.
    pub fn percent(&self) -> u64 {
        (self.get() * 100.0).round() as u64
    }
}

// ─── Task ─────────────────────────────────────────────────────────────────────

/// One blocking operation run by [`crate::runner::TaskRunner`].
pub trait Task: Sync {
    type Output: Send;
    type Error: Send;

    /// Label shown next to the spinner or bar.
    fn description(&self) -> &str;

    fn progress_kind(&self) -> ProgressKind {
        ProgressKind::Spinner
    }

    /// Do the work.  Called exactly once, on the worker thread.
    fn run(&self, progress: &Progress) -> Result<Self::Output, Self::Error>;

    /// Ask `run` to stop early.  Called at most once, from the polling thread,
    /// possibly while `run` is executing.
    fn cancel(&self) {}
}

// ─── Step ─────────────────────────────────────────────────────────────────────

/// A task built from a closure: one façade call behind a spinner.
pub struct Step<'a, F> {
    description: String,
    work: F,
    on_cancel: Option<Box<dyn Fn() + Send + Sync + 'a>>,
}

impl<'a, F, T, E> Step<'a, F>
where
    F: Fn() -> Result<T, E> + Sync,
{
    pub fn new(description: impl Into<String>, work: F) -> Self {
        Self {
            description: description.into(),
            work,
            on_cancel: None,
        }
    }

    /// Hook invoked when the runner cancels this step.
    #[must_use]
    pub fn on_cancel(mut self, f: impl Fn() + Send + Sync + 'a) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }
}

impl<F, T, E> Task for Step<'_, F>
where
    F: Fn() -> Result<T, E> + Sync,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, _progress: &Progress) -> Result<T, E> {
        (self.work)()
    }

    fn cancel(&self) {
        if let Some(ref f) = self.on_cancel {
            f();
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
