//! Command-line interface definition.
//!
//! All argument parsing lives here so the rest of the codebase can stay
//! agnostic to `clap`.  [`Cli`] is the raw clap view; [`Options`] is what the
//! rest of the program consumes: empty values dropped, credentials grouped,
//! and a record of which inputs came from the environment.

use std::{ffi::OsString, fmt, path::PathBuf};

use clap::{
    ArgMatches, Command, CommandFactory, FromArgMatches, Parser, ValueEnum,
    builder::{FalseyValueParser, OsStringValueParser, TypedValueParser},
    parser::ValueSource,
};

use crate::{login::Credentials, session::StartupInputs};

/// Top-level CLI arguments.  Every input can also come from an `ET_*`
/// environment variable; a flag wins over its variable.
#[derive(Parser, Debug)]
#[command(
    name    = "mail-export",
    about   = "Back up a mail account to disk, or restore a previous backup",
    version,
    // Show a compact two-column help layout.
    help_template = "\
{before-help}{name} {version}
{about}

{usage-heading} {usage}

{all-args}{after-help}"
)]
pub struct Cli {
    /// Operation to run: `backup` or `restore`.  Asked interactively when
    /// omitted or empty.
    #[arg(short, long, env = "ET_OPERATION", value_name = "OPERATION", value_parser = parse_operation)]
    pub operation: Option<String>,

    /// Export directory (backup) or backup directory (restore).
    ///
    /// For backup, relative paths are resolved against the configured output
    /// directory and the directory is created if needed.  For restore the
    /// directory must already exist.
    #[arg(short, long, env = "ET_DIR", value_parser = OsStringValueParser::new().map(PathBuf::from))]
    pub dir: Option<PathBuf>,

    /// Account email address.
    #[arg(short, long, env = "ET_USER_EMAIL")]
    pub user: Option<String>,

    /// Account password.
    #[arg(short, long, env = "ET_USER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Mailbox password, for accounts that have a separate one.
    #[arg(short, long = "mbox-password", env = "ET_USER_MAILBOX_PASSWORD", hide_env_values = true)]
    pub mbox_password: Option<String>,

    /// Current TOTP code, for accounts with two-factor authentication.
    #[arg(short, long, env = "ET_TOTP_CODE", hide_env_values = true)]
    pub totp: Option<String>,

    /// Do not send usage telemetry.
    #[arg(short = 'k', long, env = "ET_TELEMETRY_OFF", value_parser = FalseyValueParser::new())]
    pub telemetry_off: bool,

    /// Path to the configuration file.
    ///
    /// Defaults to `mail-export/config.toml` under the platform config
    /// directory.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    Backup,
    Restore,
}

impl Operation {
    /// Parse an interactive answer.
    pub fn from_answer(answer: &str) -> Option<Self> {
        Self::from_str(answer.trim(), true).ok()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
        })
    }
}

/// Accept an operation name, or nothing at all.
fn parse_operation(value: &str) -> Result<String, String> {
    if value.trim().is_empty() || Operation::from_answer(value).is_some() {
        Ok(value.to_string())
    } else {
        Err("expected 'backup' or 'restore'".into())
    }
}

/// Argument ids and the variables that feed them.
const ENV_BINDINGS: [(&str, &str); 7] = [
    ("operation", "ET_OPERATION"),
    ("dir", "ET_DIR"),
    ("user", "ET_USER_EMAIL"),
    ("password", "ET_USER_PASSWORD"),
    ("mbox_password", "ET_USER_MAILBOX_PASSWORD"),
    ("totp", "ET_TOTP_CODE"),
    ("telemetry_off", "ET_TELEMETRY_OFF"),
];

/// The clap command, with bindings to set-but-empty variables removed so they
/// read as absent rather than as an invalid value.
fn command() -> Command {
    ENV_BINDINGS
        .iter()
        .filter(|(_, var)| std::env::var_os(var).is_some_and(|v| v.is_empty()))
        .fold(Cli::command(), |cmd, (id, _)| cmd.mut_arg(*id, |arg| arg.env(None::<&'static str>)))
}

// ─── Normalised options ───────────────────────────────────────────────────────

/// Parsed and normalised command-line inputs.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub operation: Option<Operation>,
    pub dir: Option<PathBuf>,
    pub credentials: Credentials,
    pub telemetry_off: bool,
    pub config: Option<PathBuf>,
    /// Which inputs were taken from environment variables.
    pub from_env: StartupInputs,
}

impl Options {
    /// Parse `std::env::args_os()`, exiting with clap's diagnostics on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::from_matches(&command().try_get_matches_from(args)?)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let cli = Cli::from_arg_matches(matches)?;
        let from_env = |id: &str| matches.value_source(id) == Some(ValueSource::EnvVariable);

        Ok(Self {
            operation: cli.operation.as_deref().and_then(Operation::from_answer),
            dir: cli.dir.filter(|d| !d.as_os_str().is_empty()),
            credentials: Credentials {
                email: non_empty(cli.user),
                password: non_empty(cli.password),
                mailbox_password: non_empty(cli.mbox_password),
                totp: non_empty(cli.totp),
            },
            telemetry_off: cli.telemetry_off,
            config: cli.config,
            from_env: StartupInputs {
                operation: from_env("operation"),
                dir: from_env("dir"),
                password: from_env("password"),
                mailbox_password: from_env("mbox_password"),
                totp: from_env("totp"),
                email: from_env("user"),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
