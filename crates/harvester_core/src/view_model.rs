use crate::Phase;

/// Snapshot of a pipeline run, suitable for logging or printing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub phase: Phase,
    pub enqueued: usize,
    pub workers: usize,
    pub workers_exited: usize,
    pub handled: usize,
    pub staged: usize,
    pub merged: usize,
    pub dropped: usize,
    pub merge_failures: usize,
    pub stuck_workers: usize,
}

impl RunSummary {
    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Terminated with every staged result accounted for by the output artifact.
    pub fn is_clean(&self) -> bool {
        self.is_terminated() && self.merge_failures == 0
    }
}
