use crate::view_model::RunSummary;
use crate::WorkerTally;

/// Coordinator lifecycle. Moves strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Draining,
    Cancelling,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineState {
    phase: Phase,
    workers: usize,
    workers_exited: usize,
    enqueued: usize,
    totals: WorkerTally,
    stuck_workers: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            phase: self.phase,
            enqueued: self.enqueued,
            workers: self.workers,
            workers_exited: self.workers_exited,
            handled: self.totals.handled,
            staged: self.totals.staged,
            merged: self.totals.merged,
            dropped: self.totals.dropped,
            merge_failures: self.totals.merge_failures,
            stuck_workers: self.stuck_workers,
        }
    }

    pub(crate) fn start(&mut self, workers: usize) {
        self.workers = workers;
        self.phase = Phase::Running;
    }

    pub(crate) fn record_enqueued(&mut self) {
        self.enqueued += 1;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Returns true once every started worker has reported its exit.
    pub(crate) fn record_exit(&mut self, tally: &WorkerTally) -> bool {
        self.totals.absorb(tally);
        self.workers_exited += 1;
        self.workers_exited >= self.workers
    }

    pub(crate) fn record_stuck(&mut self, stuck: usize) {
        self.stuck_workers = stuck;
    }
}
