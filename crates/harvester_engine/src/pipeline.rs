//! Pipeline coordinator: owns the queue, the worker pool and the output
//! artifact for one run, and drives the lifecycle state machine from
//! `harvester_core` by executing the effects it emits.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_error, engine_info, engine_warn};
use futures_util::{stream, Stream, StreamExt};
use harvester_core::{parse_url_line, update, Effect, Msg, PipelineState, RunSummary};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::artifact::{MergeError, OutputArtifact};
use crate::fetch::{Fetcher, NullSink, ProgressSink};
use crate::merge::Merger;
use crate::queue::WorkQueue;
use crate::staging::{StagingError, StagingStore};
use crate::worker::{MergePolicy, WorkerContext, WorkerPool};
use crate::PipelineEvent;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub request_timeout: Duration,
    /// How long workers get to exit after cancellation.
    pub shutdown_grace: Duration,
    pub merge_policy: MergePolicy,
    /// Emit `{"url": ...}` without content for unparseable bodies instead of dropping them.
    pub keep_unparsed: bool,
    pub output_path: PathBuf,
    /// Scratch directory; a private temp directory when unset.
    pub staging_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn with_output(output_path: impl Into<PathBuf>) -> Self {
        Self {
            queue_capacity: 100,
            workers: 5,
            request_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            merge_policy: MergePolicy::Deferred,
            keep_unparsed: false,
            output_path: output_path.into(),
            staging_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Config("worker count must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config("queue capacity must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(PipelineError::Config("request timeout must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_output("results.jsonl")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot read url source {path:?}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("staging store unavailable: {0}")]
    Staging(#[from] StagingError),
    #[error("output artifact: {0}")]
    Artifact(#[from] MergeError),
    #[error("{stuck} workers still running after the {grace:?} shutdown grace period")]
    ShutdownTimeout {
        stuck: usize,
        grace: Duration,
        summary: RunSummary,
    },
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn ProgressSink>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline over a line-delimited URL file, reading it while enqueueing.
    pub async fn run_file(self, path: impl AsRef<Path>) -> Result<RunSummary, PipelineError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| PipelineError::Source {
                path: path.to_path_buf(),
                source,
            })?;
        let display = path.display().to_string();
        let reader = BufReader::new(file);
        let urls = stream::unfold((reader, 0usize), move |(mut reader, mut line_no)| {
            let display = display.clone();
            async move {
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => return None,
                        Ok(_) => {
                            line_no += 1;
                            match std::str::from_utf8(&buf) {
                                Ok(line) => {
                                    if let Some(url) = parse_url_line(line) {
                                        return Some((url, (reader, line_no)));
                                    }
                                }
                                Err(err) => {
                                    engine_warn!("Skipping line {} of {}: {}", line_no, display, err)
                                }
                            }
                        }
                        Err(err) => {
                            // Treated as end of input; what was enqueued still drains.
                            engine_error!("Stopped reading {}: {}", display, err);
                            return None;
                        }
                    }
                }
            }
        });
        self.run(urls).await
    }

    /// Runs the pipeline over an in-memory URL list.
    pub async fn run_urls<I>(self, urls: I) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send,
    {
        self.run(stream::iter(urls)).await
    }

    /// Runs the full lifecycle: start workers, feed the queue, wait for the drain,
    /// cancel, wait for the workers, publish the artifact.
    pub async fn run<S>(self, urls: S) -> Result<RunSummary, PipelineError>
    where
        S: Stream<Item = String> + Send,
    {
        self.config.validate()?;
        let config = self.config;

        let staging = match &config.staging_dir {
            Some(dir) => StagingStore::in_dir(dir)?,
            None => StagingStore::temporary()?,
        };
        let artifact = Arc::new(OutputArtifact::create(&config.output_path)?);
        let queue = Arc::new(WorkQueue::new(config.queue_capacity));
        let merger = Arc::new(Merger::new(artifact.clone(), config.keep_unparsed));

        let pool = WorkerPool::spawn(
            config.workers,
            WorkerContext {
                queue: queue.clone(),
                fetcher: self.fetcher,
                staging: Arc::new(staging),
                merger,
                sink: self.sink.clone(),
                request_timeout: config.request_timeout,
                merge_policy: config.merge_policy,
            },
        );
        engine_info!(
            "Started {} workers (queue capacity {}, timeout {:?}, {:?} merge)",
            pool.len(),
            queue.capacity(),
            config.request_timeout,
            config.merge_policy
        );

        let mut urls = Box::pin(urls);
        let mut pool = Some(pool);
        let mut state = PipelineState::new();
        let mut effects = VecDeque::new();
        let mut published: Option<PathBuf> = None;
        dispatch(&mut state, &mut effects, Msg::WorkersStarted { count: config.workers });

        while let Some(effect) = effects.pop_front() {
            match effect {
                Effect::FeedQueue => {
                    while let Some(url) = urls.next().await {
                        if let Err(err) = queue.enqueue(url.clone()).await {
                            engine_error!("Could not enqueue {}: {}", url, err);
                            break;
                        }
                        self.sink.emit(PipelineEvent::Enqueued { url });
                        dispatch(&mut state, &mut effects, Msg::UrlEnqueued);
                    }
                    dispatch(&mut state, &mut effects, Msg::SourceExhausted);
                }
                Effect::CloseQueue => queue.close_when_drained(),
                Effect::AwaitDrain => {
                    engine_info!("All {} urls enqueued; waiting for drain", state.summary().enqueued);
                    queue.join().await;
                    dispatch(&mut state, &mut effects, Msg::QueueDrained);
                }
                Effect::SignalCancel => {
                    if let Some(pool) = &pool {
                        pool.cancel();
                    }
                }
                Effect::AwaitWorkers => {
                    let Some(pool) = pool.take() else { continue };
                    let exit = pool.join(config.shutdown_grace).await;
                    for tally in exit.tallies {
                        dispatch(&mut state, &mut effects, Msg::WorkerExited(tally));
                    }
                    if exit.stuck > 0 {
                        dispatch(&mut state, &mut effects, Msg::ShutdownTimedOut { stuck: exit.stuck });
                    }
                }
                Effect::CloseArtifact => {
                    published = Some(artifact.close().await?);
                }
            }
        }

        let summary = state.summary();
        if !summary.is_terminated() {
            // Keep what the healthy workers merged.
            match artifact.close().await {
                Ok(path) => engine_warn!("Published partial output to {:?}", path),
                Err(err) => engine_error!("Could not publish partial output: {}", err),
            }
            return Err(PipelineError::ShutdownTimeout {
                stuck: summary.stuck_workers,
                grace: config.shutdown_grace,
                summary,
            });
        }

        engine_info!(
            "Pipeline terminated: {} enqueued, {} staged, {} merged, {} dropped, {} merge failures -> {:?}",
            summary.enqueued,
            summary.staged,
            summary.merged,
            summary.dropped,
            summary.merge_failures,
            published
        );
        if summary.merge_failures > 0 {
            engine_error!(
                "{} staged results could not be appended to the output artifact",
                summary.merge_failures
            );
        }
        Ok(summary)
    }
}

fn dispatch(state: &mut PipelineState, effects: &mut VecDeque<Effect>, msg: Msg) {
    let before = state.phase();
    let (next, new_effects) = update(std::mem::take(state), msg);
    *state = next;
    if state.phase() != before {
        engine_info!("Pipeline {:?} -> {:?}", before, state.phase());
    }
    effects.extend(new_effects);
}
