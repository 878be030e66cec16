//! Task runner — blocking work on a worker thread, feedback on the main one.
//!
//! [`TaskRunner::run`] spawns exactly one scoped worker thread for the task
//! body and keeps the calling thread in a [`POLL_INTERVAL`] loop that:
//!
//! 1. redraws the spinner or percentage bar,
//! 2. checks the quit signal and, the first time it is set, calls
//!    [`Task::cancel`] (once),
//! 3. returns once the worker has actually finished.
//!
//! The worker is never killed; `cancel` is advisory.  Because the worker is
//! scoped, nothing the task borrows can outlive the call.
//!
//! Retrying is not the runner's business.  A failed task comes back as
//! [`RunError::Failed`] carrying the task's own error; a task that stopped
//! after being cancelled comes back as [`RunError::Cancelled`].

use std::{
    panic,
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
};

use indicatif::ProgressBar;
use thiserror::Error;

use crate::{
    signal::{AppState, POLL_INTERVAL, Wait, wait_for},
    task::{Progress, ProgressKind, Task},
    ui::{self, Draw},
};

/// How a task run ended, when it did not produce a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError<E> {
    /// Cancellation was requested and the task stopped without a value.
    #[error("operation cancelled")]
    Cancelled,

    /// The task body failed on its own.
    #[error("{0}")]
    Failed(E),
}

/// Executes [`Task`]s one at a time.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    state: AppState,
    draw: Draw,
}

impl TaskRunner {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            draw: Draw::Terminal,
        }
    }

    /// Draw indicators to `draw` instead of stderr.
    #[must_use]
    pub fn with_draw(mut self, draw: Draw) -> Self {
        self.draw = draw;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run `task` to completion on a worker thread.
    ///
    /// Outcome mapping:
    ///
    /// | Task returned | Cancel requested | Result                    |
    /// |---------------|------------------|---------------------------|
    /// | `Ok(v)`       | either           | `Ok(v)`                   |
    /// | `Err(e)`      | no               | `Err(RunError::Failed(e))`|
    /// | `Err(_)`      | yes              | `Err(RunError::Cancelled)`|
    ///
    /// A panic in the task body is resumed on the calling thread.
    pub fn run<T: Task>(&self, task: &T) -> Result<T::Output, RunError<T::Error>> {
        let label = task.description().to_string();
        let kind = task.progress_kind();
        let indicator = match kind {
            ProgressKind::Spinner => ui::make_spinner(&label, self.draw),
            ProgressKind::Percentage => ui::make_bar(&label, self.draw),
        };
        let progress = Progress::new();

        tracing::debug!(task = %label, "task started");

        let (result, cancelled) = thread::scope(|scope| {
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let progress = &progress;
            let worker = scope.spawn(move || {
                let result = task.run(progress);
                let _ = done_tx.send(());
                result
            });

            let mut redraw = Redraw {
                bar: &indicator,
                label: &label,
                kind,
                progress,
                state: &self.state,
                network_lost: false,
            };

            let cancelled = match wait_for(&done_rx, self.state.quit_signal(), || redraw.tick()) {
                Wait::Ready(()) | Wait::Closed => false,
                Wait::Quit => {
                    if self.state.quit_signal().acknowledge() {
                        indicator.suspend(ui::print_ctrl_c_ack);
                    }
                    tracing::info!(task = %label, "cancelling task");
                    indicator.set_message(format!("{label} (cancelling)"));
                    task.cancel();
                    drain(&done_rx, || redraw.tick());
                    true
                },
            };

            match worker.join() {
                Ok(result) => (result, cancelled),
                Err(payload) => panic::resume_unwind(payload),
            }
        });

        indicator.finish_and_clear();

        match result {
            Ok(value) => {
                tracing::debug!(task = %label, "task finished");
                ui::print_task_ok(&label);
                Ok(value)
            },
            Err(_) if cancelled => {
                tracing::info!(task = %label, "task cancelled");
                ui::print_task_cancelled(&label);
                Err(RunError::Cancelled)
            },
            Err(err) => {
                tracing::warn!(task = %label, "task failed");
                ui::print_task_failed(&label);
                Err(RunError::Failed(err))
            },
        }
    }
}

/// Keep redrawing until the worker signals completion (or dies).
fn drain(rx: &Receiver<()>, mut on_tick: impl FnMut()) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => on_tick(),
        }
    }
}

/// Per-tick rendering state for one run.
struct Redraw<'a> {
    bar: &'a ProgressBar,
    label: &'a str,
    kind: ProgressKind,
    progress: &'a Progress,
    state: &'a AppState,
    network_lost: bool,
}

impl Redraw<'_> {
    fn tick(&mut self) {
        let lost = self.state.network_lost();
        if lost != self.network_lost {
            self.network_lost = lost;
            self.bar.set_message(ui::task_message(self.label, lost));
        }
        match self.kind {
            ProgressKind::Spinner => self.bar.tick(),
            ProgressKind::Percentage => self.bar.set_position(self.progress.percent()),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
