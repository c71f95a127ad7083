/// Side effects requested by [`crate::update`]; the coordinator executes them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Push every URL from the source into the work queue.
    FeedQueue,
    /// No more URLs will arrive; let consumers observe exhaustion once empty.
    CloseQueue,
    /// Wait until every enqueued URL has been acknowledged as handled.
    AwaitDrain,
    /// Tell all workers to stop taking work and flush what they hold.
    SignalCancel,
    /// Wait for every worker to exit, bounded by the shutdown grace period.
    AwaitWorkers,
    /// Publish the output artifact.
    CloseArtifact,
}
