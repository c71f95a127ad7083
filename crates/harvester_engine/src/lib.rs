//! Harvester engine: concurrent URL harvesting pipeline.
//!
//! URLs flow from a source into a bounded [`WorkQueue`], are fetched by a
//! [`WorkerPool`], staged in a [`StagingStore`] and finally merged by a
//! [`Merger`] into one line-delimited JSON [`OutputArtifact`]. [`Pipeline`]
//! coordinates the lifecycle.
mod artifact;
mod decode;
mod fetch;
mod merge;
mod pipeline;
mod queue;
mod retry;
mod staging;
mod types;
mod worker;

pub use artifact::{ensure_output_dir, MergeError, OutputArtifact, PersistError};
pub use decode::{decode_body, DecodeError, DecodedBody};
pub use fetch::{
    BodyStream, FetchResponse, FetchSettings, Fetcher, NullSink,
    ProgressSink, ReqwestFetcher,
};
pub use merge::{parse_staged, BatchOutcome, MergeOutcome, MergedRecord, Merger, ParseError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use queue::{QueueError, WorkItem, WorkQueue};
pub use retry::{RetryingFetcher, RetrySettings};
pub use staging::{StagedResult, StagingError, StagingHandle, StagingStore};
pub use types::{DropReason, FailureKind, FetchError, PipelineEvent, WorkerId};
pub use worker::{MergePolicy, PoolExit, WorkerContext, WorkerPool};

pub use harvester_core::{Phase, RunSummary, WorkerTally};
