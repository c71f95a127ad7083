use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use engine_logging::engine_info;
use harvester_engine::{FetchSettings, MergePolicy, PipelineConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Effective settings: built-in defaults, overridden by the config file, overridden
/// by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub queue_capacity: usize,
    pub workers: usize,
    pub timeout_secs: u64,
    pub connection_limit: usize,
    pub retries: u32,
    pub staging_dir: Option<PathBuf>,
    pub merge_policy: MergePolicy,
    pub keep_unparsed: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("urls.txt"),
            output: PathBuf::from("results.jsonl"),
            queue_capacity: 100,
            workers: 5,
            timeout_secs: 60,
            connection_limit: 5,
            retries: 0,
            staging_dir: None,
            merge_policy: MergePolicy::Deferred,
            keep_unparsed: false,
            shutdown_grace_secs: 30,
        }
    }
}

impl HarvestConfig {
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let config: HarvestConfig = ron::from_str(&content)
            .with_context(|| format!("failed to parse config file {path:?}"))?;
        engine_info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(input) = &cli.input {
            self.input = input.clone();
        }
        if let Some(output) = &cli.output {
            self.output = output.clone();
        }
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(timeout) = cli.timeout {
            self.timeout_secs = timeout;
        }
        if let Some(limit) = cli.connection_limit {
            self.connection_limit = limit;
        }
        if let Some(retries) = cli.retries {
            self.retries = retries;
        }
        if let Some(dir) = &cli.staging_dir {
            self.staging_dir = Some(dir.clone());
        }
        if let Some(policy) = cli.merge_policy {
            self.merge_policy = policy;
        }
        if cli.keep_unparsed {
            self.keep_unparsed = true;
        }
        if let Some(grace) = cli.shutdown_grace {
            self.shutdown_grace_secs = grace;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.connection_limit == 0 {
            bail!("connection limit must be at least 1");
        }
        self.pipeline_config().validate()?;
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            workers: self.workers,
            request_timeout: Duration::from_secs(self.timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            merge_policy: self.merge_policy,
            keep_unparsed: self.keep_unparsed,
            output_path: self.output.clone(),
            staging_dir: self.staging_dir.clone(),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.timeout_secs),
            connection_limit: self.connection_limit,
            ..FetchSettings::default()
        }
    }
}
