/// Per-worker counters reported once, when the worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerTally {
    /// Items taken off the queue and acknowledged.
    pub handled: usize,
    /// Successful responses written to staging.
    pub staged: usize,
    /// Records appended to the output artifact.
    pub merged: usize,
    /// Items dropped: transport failures, non-200 responses, staging or parse errors.
    pub dropped: usize,
    /// Staged results lost because the output artifact rejected the append.
    pub merge_failures: usize,
}

impl WorkerTally {
    pub fn absorb(&mut self, other: &WorkerTally) {
        self.handled += other.handled;
        self.staged += other.staged;
        self.merged += other.merged;
        self.dropped += other.dropped;
        self.merge_failures += other.merge_failures;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The worker pool is up.
    WorkersStarted { count: usize },
    /// One URL was accepted by the work queue.
    UrlEnqueued,
    /// The URL source has no more lines.
    SourceExhausted,
    /// Every enqueued item has been acknowledged.
    QueueDrained,
    /// A worker has exited, including any final merge it performed.
    WorkerExited(WorkerTally),
    /// The shutdown grace period expired with workers still running.
    ShutdownTimedOut { stuck: usize },
}
