use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use tocinventory::cli::{Cli, Command};
use tocinventory::config::Config;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `run` takes DEBUG from its resolved config, YAML file included.
    let run_config = match &cli.command {
        Command::Run(args) => Some(Config::for_run(args).context("load config")?),
        _ => None,
    };
    let debug = cli.debug
        || run_config
            .as_ref()
            .map_or_else(tocinventory::config::env_debug, |config| config.debug);
    tocinventory::logging::init(debug).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Flatten(args) => {
            tocinventory::toc::run(args).context("flatten")?;
        }
        Command::Metadata(args) => {
            tocinventory::metadata::run(args).context("metadata")?;
        }
        Command::Content(args) => {
            tocinventory::content::run(args).context("content")?;
        }
        Command::Merge(args) => {
            tocinventory::merge::run(args).context("merge")?;
        }
        Command::Run(args) => {
            let config = match run_config {
                Some(config) => config,
                None => Config::for_run(&args).context("load config")?,
            };
            tracing::debug!(?config, "resolved config");
            tocinventory::pipeline::run(&config, &args).context("run")?;
        }
        Command::Summarize(args) => {
            tocinventory::summarize::run(args).context("summarize")?;
        }
        Command::Stats(args) => {
            tocinventory::stats::run(args).context("stats")?;
        }
    }

    Ok(())
}
