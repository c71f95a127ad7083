mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine_logging::{engine_error, engine_info, LogDestination};
use harvester_engine::{
    Fetcher, Pipeline, PipelineError, ReqwestFetcher, RetrySettings, RetryingFetcher, RunSummary,
};
use log::LevelFilter;

use crate::cli::Cli;
use crate::config::HarvestConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let destination = LogDestination::from_name(&cli.log).unwrap_or(LogDestination::Terminal);
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    engine_logging::initialize(destination, level);

    match run(&cli) {
        Ok(summary) => {
            println!(
                "harvested {} of {} urls ({} dropped, {} merge failures)",
                summary.merged, summary.enqueued, summary.dropped, summary.merge_failures
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let config = HarvestConfig::resolve(cli)?;
    engine_info!("Harvesting {:?} into {:?}", config.input, config.output);

    let fetcher = build_fetcher(&config)?;
    let pipeline = Pipeline::new(config.pipeline_config(), fetcher);

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = runtime.block_on(pipeline.run_file(&config.input));
    match result {
        Ok(summary) => Ok(summary),
        Err(err @ PipelineError::ShutdownTimeout { .. }) => {
            Err(anyhow::Error::new(err).context("pipeline did not terminate"))
        }
        Err(err) => Err(err.into()),
    }
}

fn build_fetcher(config: &HarvestConfig) -> anyhow::Result<Arc<dyn Fetcher>> {
    let http = ReqwestFetcher::new(config.fetch_settings()).context("failed to build http client")?;
    if config.retries == 0 {
        return Ok(Arc::new(http));
    }
    let retry = RetrySettings {
        attempts: config.retries + 1,
        ..RetrySettings::default()
    };
    Ok(Arc::new(RetryingFetcher::new(http, retry)))
}
