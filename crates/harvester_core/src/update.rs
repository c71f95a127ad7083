use crate::{Effect, Msg, Phase, PipelineState};

/// Pure update function: applies a message to state and returns any effects.
///
/// Messages that do not fit the current phase are ignored.
pub fn update(mut state: PipelineState, msg: Msg) -> (PipelineState, Vec<Effect>) {
    let effects = match (state.phase(), msg) {
        (Phase::Idle, Msg::WorkersStarted { count }) if count > 0 => {
            state.start(count);
            vec![Effect::FeedQueue]
        }
        (Phase::Running, Msg::UrlEnqueued) => {
            state.record_enqueued();
            Vec::new()
        }
        (Phase::Running, Msg::SourceExhausted) => {
            state.set_phase(Phase::Draining);
            vec![Effect::CloseQueue, Effect::AwaitDrain]
        }
        (Phase::Draining, Msg::QueueDrained) => {
            state.set_phase(Phase::Cancelling);
            vec![Effect::SignalCancel, Effect::AwaitWorkers]
        }
        (Phase::Cancelling, Msg::WorkerExited(tally)) => {
            if state.record_exit(&tally) {
                state.set_phase(Phase::Terminated);
                vec![Effect::CloseArtifact]
            } else {
                Vec::new()
            }
        }
        (Phase::Cancelling, Msg::ShutdownTimedOut { stuck }) => {
            state.record_stuck(stuck);
            Vec::new()
        }
        _ => Vec::new(),
    };

    (state, effects)
}
