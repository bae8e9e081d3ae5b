//! sis-install - SIS package installer

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sis_cli::ui::Output;
use sis_cli::{Cli, Mode, cmd};
use sis_core::{Reporter, Session};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();
    tracing::debug!(?config, mode = ?cli.mode(), "starting");
    let reporter = Arc::new(Output::new());
    let mut session = match Session::open(&config, reporter.clone()) {
        Ok(session) => session,
        Err(e) => {
            reporter.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cli, &mut session);
    if let Err(e) = &result {
        session.ctx.error(&format!("{e:#}"));
    }
    session.cleanup();

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli, session: &mut Session) -> Result<()> {
    match cli.mode() {
        Mode::List => cmd::list::list(session),
        Mode::Info => cmd::info::info(session, &cli.packages),
        Mode::Uninstall => cmd::remove::remove(session, &cli.packages),
        Mode::Source { makefile } => cmd::source::source(session, &cli.packages, makefile),
        Mode::Default => cmd::install::install_default(session),
        Mode::Install => cmd::install::install(session, &cli.packages),
    }
}
