use std::{process::ExitCode, sync::Arc};

use anyhow::{Context as _, Result};
use mail_export::{
    app::{self, App},
    cli::Options,
    config::Config,
    disk::SystemDisks,
    logging,
    prompt::TerminalPrompter,
    remote::RemoteSession,
    runner::TaskRunner,
    signal::{self, AppState, NetworkStatus, QuitSignal},
    ui,
};

fn main() -> ExitCode {
    let options = Options::parse();
    ui::print_startup_banner(env!("CARGO_PKG_VERSION"));

    match run(&options) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "start-up failed");
            ui::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        },
    }
}

fn run(options: &Options) -> Result<ExitCode> {
    let config = Config::load(options.config.as_deref())?;

    // Without a log file the run is still useful; say so and carry on.
    let _log = match logging::init(&config.paths.log_dir) {
        Ok(handle) => {
            tracing::debug!(path = %handle.path.display(), "logging to file");
            Some(handle)
        },
        Err(e) => {
            ui::print_notice(&format!("Logging is disabled: {e:#}"));
            None
        },
    };

    let quit = QuitSignal::process();
    signal::install_handler(&quit).context("installing the Ctrl+C handler")?;

    let network = NetworkStatus::new();
    let telemetry = !(options.telemetry_off || config.telemetry.disabled);
    let session = RemoteSession::new(&config.api.url, Arc::new(network.clone()), telemetry)
        .context("building the HTTP client")?;
    tracing::info!(api = %config.api.url, telemetry, "session ready");

    let runner = TaskRunner::new(AppState::new(quit.clone(), network));
    let mut prompter = TerminalPrompter::new(quit);
    let mut app = App {
        session: &session,
        prompter: &mut prompter,
        runner: &runner,
        disks: &SystemDisks,
        output_dir: &config.paths.output_dir,
    };

    let result = app.run(options);
    if let Err(e) = &result {
        app::report_error(Some(&session), e);
    }
    Ok(app::exit_code(&result))
}
