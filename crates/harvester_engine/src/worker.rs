//! Fixed-size pool of workers draining the work queue.
//!
//! Each worker fetches one URL at a time, streams a 200 body into the staging
//! store and, under [`MergePolicy::Deferred`], keeps the staged results until it
//! exits. Cancellation is checked only while waiting on the queue: an item being
//! fetched is always finished first.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::StreamExt;
use harvester_core::WorkerTally;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::fetch::{Fetcher, ProgressSink};
use crate::merge::{BatchOutcome, Merger};
use crate::queue::{WorkItem, WorkQueue};
use crate::staging::{StagedResult, StagingStore};
use crate::{DropReason, FailureKind, PipelineEvent, WorkerId};

/// When staged results are written to the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Hold staged results per worker and merge them in one batch on exit.
    #[default]
    Deferred,
    /// Merge each staged result before acknowledging its item.
    Immediate,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deferred" => Ok(MergePolicy::Deferred),
            "immediate" => Ok(MergePolicy::Immediate),
            other => Err(format!("unknown merge policy '{other}' (expected deferred or immediate)")),
        }
    }
}

/// Everything a worker shares with its siblings.
pub struct WorkerContext {
    pub queue: Arc<WorkQueue>,
    pub fetcher: Arc<dyn Fetcher>,
    pub staging: Arc<StagingStore>,
    pub merger: Arc<Merger>,
    pub sink: Arc<dyn ProgressSink>,
    pub request_timeout: Duration,
    pub merge_policy: MergePolicy,
}

/// How the pool shut down.
#[derive(Debug, Default)]
pub struct PoolExit {
    pub tallies: Vec<WorkerTally>,
    /// Workers still running when the grace period ran out; they were aborted.
    pub stuck: usize,
}

pub struct WorkerPool {
    handles: Vec<(WorkerId, JoinHandle<WorkerTally>)>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn spawn(count: usize, ctx: WorkerContext) -> Self {
        let ctx = Arc::new(ctx);
        let cancel = CancellationToken::new();
        let handles = (0..count)
            .map(|id| {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                (id, tokio::spawn(run_worker(id, ctx, cancel)))
            })
            .collect();
        Self { handles, cancel }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wakes idle workers and stops them from taking new items.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every worker to exit, aborting those still running at `grace`.
    pub async fn join(self, grace: Duration) -> PoolExit {
        // A grace period past the clock's range means waiting without a deadline.
        let deadline = Instant::now().checked_add(grace);
        let mut exit = PoolExit::default();
        for (id, mut handle) in self.handles {
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await,
                None => Ok((&mut handle).await),
            };
            match joined {
                Ok(Ok(tally)) => exit.tallies.push(tally),
                Ok(Err(err)) => {
                    engine_error!("Worker {} ended abnormally: {}", id, err);
                    exit.tallies.push(WorkerTally::default());
                }
                Err(_) => {
                    engine_error!("Worker {} did not exit within {:?}; aborting", id, grace);
                    handle.abort();
                    exit.stuck += 1;
                }
            }
        }
        exit
    }
}

async fn run_worker(id: WorkerId, ctx: Arc<WorkerContext>, cancel: CancellationToken) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let mut pending: Vec<StagedResult> = Vec::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = ctx.queue.dequeue(id) => item,
        };
        let Some(item) = item else {
            engine_debug!("Worker {} found the queue closed and empty", id);
            break;
        };

        ctx.sink.emit(PipelineEvent::Dequeued {
            worker: id,
            url: item.url.clone(),
        });

        match stage_item(&ctx, &item).await {
            Ok(staged) => {
                tally.staged += 1;
                ctx.sink.emit(PipelineEvent::Staged {
                    worker: id,
                    url: item.url.clone(),
                    bytes: staged.size(),
                });
                match ctx.merge_policy {
                    MergePolicy::Deferred => pending.push(staged),
                    MergePolicy::Immediate => merge_now(&ctx, id, vec![staged], &mut tally).await,
                }
            }
            Err(reason) => {
                engine_warn!("Dropping {}: {}", item.url, reason);
                tally.dropped += 1;
                ctx.sink.emit(PipelineEvent::Dropped {
                    worker: id,
                    url: item.url.clone(),
                    reason,
                });
            }
        }

        tally.handled += 1;
        if let Err(err) = ctx.queue.task_done() {
            engine_error!("Worker {}: {}", id, err);
        }
    }

    if !pending.is_empty() {
        engine_info!("Worker {} merging {} staged results before exit", id, pending.len());
        merge_now(&ctx, id, pending, &mut tally).await;
    }
    engine_debug!("Worker {} exiting: {:?}", id, tally);
    tally
}

/// Fetches and stages one item under the per-request deadline.
async fn stage_item(ctx: &WorkerContext, item: &WorkItem) -> Result<StagedResult, DropReason> {
    // On timeout the in-flight handle is dropped, which deletes its scratch file.
    match tokio::time::timeout(ctx.request_timeout, fetch_and_stage(ctx, &item.url)).await {
        Ok(result) => result,
        Err(_) => Err(DropReason::Transport(FailureKind::Timeout)),
    }
}

async fn fetch_and_stage(ctx: &WorkerContext, url: &str) -> Result<StagedResult, DropReason> {
    let response = ctx
        .fetcher
        .fetch(url, ctx.request_timeout)
        .await
        .map_err(|err| {
            engine_debug!("Fetch of {} failed: {}", url, err);
            DropReason::Transport(err.kind)
        })?;

    if response.status != 200 {
        return Err(DropReason::NonSuccessStatus(response.status));
    }

    let mut handle = ctx
        .staging
        .open(url, response.content_type)
        .map_err(|err| DropReason::Staging(err.to_string()))?;

    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let written = match chunk {
            Ok(bytes) => ctx
                .staging
                .write(&mut handle, &bytes)
                .await
                .map_err(|err| DropReason::Staging(err.to_string())),
            Err(err) => {
                engine_debug!("Body of {} failed mid-stream: {}", url, err);
                Err(DropReason::Transport(err.kind))
            }
        };
        if let Err(reason) = written {
            if let Err(err) = ctx.staging.discard(handle) {
                engine_warn!("Failed to discard scratch file for {}: {}", url, err);
            }
            return Err(reason);
        }
    }

    ctx.staging
        .finalize(handle)
        .await
        .map_err(|err| DropReason::Staging(err.to_string()))
}

async fn merge_now(ctx: &WorkerContext, id: WorkerId, batch: Vec<StagedResult>, tally: &mut WorkerTally) {
    let outcome = ctx.merger.merge_batch(&batch).await;
    record_batch(ctx, id, outcome, tally);
    // Dropping the batch removes the scratch files.
    drop(batch);
}

fn record_batch(ctx: &WorkerContext, id: WorkerId, outcome: BatchOutcome, tally: &mut WorkerTally) {
    let BatchOutcome {
        merged,
        unparsed,
        failed,
    } = outcome;

    for (url, err) in unparsed {
        engine_warn!("Unparseable body from {}: {}", url, err);
        if !ctx.merger.keeps_unparsed() {
            tally.dropped += 1;
            ctx.sink.emit(PipelineEvent::Dropped {
                worker: id,
                url,
                reason: DropReason::Parse(err.to_string()),
            });
        }
    }

    tally.merged += merged.len();
    for url in merged {
        ctx.sink.emit(PipelineEvent::Merged { worker: id, url });
    }

    if let Some((lost, err)) = failed {
        engine_error!("Worker {} lost {} records: {}", id, lost.len(), err);
        tally.merge_failures += lost.len();
        let message = err.to_string();
        for url in lost {
            ctx.sink.emit(PipelineEvent::MergeFailed {
                worker: id,
                url,
                message: message.clone(),
            });
        }
    }
}
