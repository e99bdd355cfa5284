use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use pizzaria_deploy::logging;
use pizzaria_deploy::pipeline::{Cli, Mode, RunOutcome};
use pizzaria_deploy::{Config, Pipeline, lock};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(outcome) => {
            report(&outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            logging::init_logging(cli.log_format, None);
            tracing::error!("deploy failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RunOutcome> {
    let source = Config::source(cli.config.as_deref());
    let config = Config::load(source.as_deref()).context("loading configuration")?;
    logging::init_logging(cli.log_format, config.log_file.as_deref());

    let mode = cli.mode();
    if mode != Mode::Status {
        if let Err(e) = lock::release_on_signal(&config.lock_file) {
            tracing::warn!(error = %e, "continuing without signal cleanup");
        }
    }

    let mut pipeline = Pipeline::host(config).context("preparing deploy tools")?;
    if let Some(path) = source {
        pipeline = pipeline.config_path(path);
    }
    Ok(pipeline.run(mode)?)
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::AlreadyRunning => tracing::info!("another deploy holds the lock, exiting"),
        RunOutcome::UpToDate { revision } => {
            tracing::info!(revision = revision.short(), "already up to date");
        }
        RunOutcome::Deployed {
            reason,
            revision,
            report,
        } => tracing::info!(
            ?reason,
            revision = revision.short(),
            running = report.running,
            "deploy complete"
        ),
        RunOutcome::Reported(_) => {}
    }
}
