//! Prompt layer — reading answers from the user without losing Ctrl+C.
//!
//! A plain blocking read on stdin does not return when Ctrl+C arrives (the
//! handler restarts the syscall), so [`TerminalPrompter`] never blocks the
//! main thread on the terminal directly.  The read happens on a helper thread
//! and the main thread waits on a channel with [`wait_for`], which gives up as
//! soon as the quit signal is set.  A closed input stream (EOF) resolves the
//! same way: the source is unreadable, so the answer is
//! [`PromptError::Cancelled`].
//!
//! Two modes:
//!
//! - **Interactive** (stdin and stderr are terminals): `dialoguer` widgets, and a raw-key reader for
//!   secrets that reads Ctrl+C as a key.
//! - **Piped**: one long-lived reader thread forwards stdin lines; prompts are printed as `Label: `.

use std::{
    io::{self, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    thread,
};

use console::{Key, Term};
use dialoguer::{Confirm, Input};
use thiserror::Error;

use crate::{
    signal::{QuitSignal, Wait, wait_for},
    ui,
};

/// Empty or invalid answers tolerated before a prompt gives up.
pub const MAX_INPUT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum PromptError {
    /// Cancellation was requested, or the input stream was closed.
    #[error("input cancelled")]
    Cancelled,

    #[error("failed to read a value for '{0}'")]
    Exhausted(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Blocking question/answer primitives used by the orchestrators.
///
/// Implementors supply single reads ([`ask`](Prompter::ask),
/// [`ask_secret`](Prompter::ask_secret), [`confirm`](Prompter::confirm)); the
/// provided methods put them behind one [`MAX_INPUT_ATTEMPTS`] bound.
pub trait Prompter {
    /// One line of text.  May be empty.
    fn ask(&mut self, label: &str) -> Result<String, PromptError>;

    /// One line of text, not echoed.  May be empty.
    fn ask_secret(&mut self, label: &str) -> Result<String, PromptError>;

    /// A yes/no answer.
    fn confirm(&mut self, label: &str) -> Result<bool, PromptError>;

    /// A non-empty, trimmed line of text.
    fn read_text(&mut self, label: &str) -> Result<String, PromptError> {
        ask_until(self, label, Self::ask, |answer| Ok(answer.to_string()))
    }

    /// A non-empty, trimmed line of text, not echoed.
    fn read_secret(&mut self, label: &str) -> Result<String, PromptError> {
        ask_until(self, label, Self::ask_secret, |answer| Ok(answer.to_string()))
    }

    /// A non-empty path.  No validation.
    fn read_path(&mut self, label: &str) -> Result<PathBuf, PromptError> {
        self.read_text(label).map(PathBuf::from)
    }

    /// Path to an existing directory; re-asks on anything else.
    fn read_dir(&mut self, label: &str) -> Result<PathBuf, PromptError> {
        ask_until(self, label, Self::ask, |answer| {
            let path = PathBuf::from(answer);
            check_existing_dir(&path).map_err(|reason| format!("{}: {reason}", path.display()))?;
            Ok(path)
        })
    }
}

/// Ask until `accept` takes an answer.
///
/// Empty answers and rejected ones share a single budget of
/// [`MAX_INPUT_ATTEMPTS`]; `accept` returns the message to show on rejection.
pub fn ask_until<P, T>(
    prompter: &mut P,
    label: &str,
    read: fn(&mut P, &str) -> Result<String, PromptError>,
    mut accept: impl FnMut(&str) -> Result<T, String>,
) -> Result<T, PromptError>
where
    P: Prompter + ?Sized,
{
    for _ in 0..MAX_INPUT_ATTEMPTS {
        let answer = read(prompter, label)?;
        let answer = answer.trim();
        if answer.is_empty() {
            ui::print_error("Value can't be empty");
            continue;
        }
        match accept(answer) {
            Ok(value) => return Ok(value),
            Err(reason) => ui::print_error(&reason),
        }
    }
    Err(PromptError::Exhausted(label.to_string()))
}

/// Why `path` is not usable as an existing directory, if it is not.
pub fn check_existing_dir(path: &Path) -> Result<(), &'static str> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err("path is not a directory"),
        Err(_) => Err("path does not exist"),
    }
}

/// Parse a yes/no answer.  Only the fixed token set is accepted.
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

// ─── Terminal implementation ─────────────────────────────────────────────────

/// [`Prompter`] on the process's own stdin.
pub struct TerminalPrompter {
    quit: QuitSignal,
    interactive: bool,
    /// Piped mode only; started on first use.
    lines: Option<Receiver<io::Result<String>>>,
}

impl TerminalPrompter {
    pub fn new(quit: QuitSignal) -> Self {
        Self {
            quit,
            interactive: io::stdin().is_terminal() && Term::stderr().is_term(),
            lines: None,
        }
    }

    /// Resolve a helper-thread wait into a prompt result.
    fn settle<T>(&self, waited: Wait<io::Result<T>>) -> Result<T, PromptError> {
        match waited {
            Wait::Ready(Ok(value)) => Ok(value),
            Wait::Ready(Err(e)) if e.kind() == io::ErrorKind::Interrupted => self.interrupted(),
            Wait::Ready(Err(e)) if is_stream_closed(&e) => self.stream_closed(),
            Wait::Ready(Err(e)) => Err(PromptError::Io(e)),
            Wait::Closed => self.stream_closed(),
            Wait::Quit => self.interrupted(),
        }
    }

    /// Ctrl+C, either through the handler or read as a key.
    fn interrupted<T>(&self) -> Result<T, PromptError> {
        self.quit.request();
        if self.quit.acknowledge() {
            ui::print_ctrl_c_ack();
        }
        Err(PromptError::Cancelled)
    }

    fn stream_closed<T>(&self) -> Result<T, PromptError> {
        tracing::info!("input stream closed, treating as cancellation");
        self.quit.request();
        Err(PromptError::Cancelled)
    }

    /// Run a terminal read on a helper thread.  Nothing is drawn once quit
    /// has been requested.
    fn interact<T, F>(&self, read: F) -> Result<T, PromptError>
    where
        T: Send + 'static,
        F: FnOnce() -> io::Result<T> + Send + 'static,
    {
        if self.quit.is_requested() {
            return Err(PromptError::Cancelled);
        }
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("prompt".into())
            .spawn(move || {
                let _ = tx.send(read());
            })?;
        // On cancellation the helper is left blocked on the terminal; the
        // process exits shortly after.
        self.settle(wait_for(&rx, &self.quit, || {}))
    }

    /// Next line from the piped-stdin reader thread.
    fn next_line(&mut self, label: &str) -> Result<String, PromptError> {
        if self.quit.is_requested() {
            return Err(PromptError::Cancelled);
        }
        print!("{label}: ");
        io::stdout().flush()?;

        if self.lines.is_none() {
            self.lines = Some(spawn_line_reader()?);
        }
        let waited = match &self.lines {
            Some(rx) => wait_for(rx, &self.quit, || {}),
            None => Wait::Closed,
        };
        self.settle(waited)
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, label: &str) -> Result<String, PromptError> {
        if !self.interactive {
            return self.next_line(label);
        }
        let prompt = label.to_string();
        self.interact(move || {
            Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
                .map_err(io::Error::from)
        })
    }

    fn ask_secret(&mut self, label: &str) -> Result<String, PromptError> {
        if !self.interactive {
            return self.next_line(label);
        }
        let prompt = label.to_string();
        self.interact(move || read_masked(&Term::stderr(), &prompt))
    }

    fn confirm(&mut self, label: &str) -> Result<bool, PromptError> {
        if self.interactive {
            let prompt = label.to_string();
            return self.interact(move || Confirm::new().with_prompt(prompt).interact().map_err(io::Error::from));
        }
        let label = format!("{label} [y/n]");
        for _ in 0..MAX_INPUT_ATTEMPTS {
            let line = self.next_line(&label)?;
            if let Some(answer) = parse_yes_no(&line) {
                return Ok(answer);
            }
            ui::print_error("Please answer 'yes' or 'no'");
        }
        Err(PromptError::Exhausted(label))
    }
}

/// Read a line without echo, one raw key at a time.
///
/// The terminal only leaves its normal mode for the duration of each key, so
/// a read abandoned between keys has nothing to restore.  Ctrl+C arrives as a
/// key and is returned as [`io::ErrorKind::Interrupted`].
fn read_masked(term: &Term, label: &str) -> io::Result<String> {
    term.write_str(&format!("{label}: "))?;
    let mut line = String::new();
    loop {
        match term.read_key_raw()? {
            Key::Enter => break,
            Key::Char(c) => line.push(c),
            Key::Backspace => {
                line.pop();
            },
            Key::CtrlC => {
                term.write_line("")?;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "read interrupted"));
            },
            _ => {},
        }
    }
    term.write_line("")?;
    Ok(line)
}

/// Spawn the thread that owns stdin in piped mode.  The sender is dropped at
/// EOF, which the waiting side sees as a closed stream.
fn spawn_line_reader() -> io::Result<Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn is_stream_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────
