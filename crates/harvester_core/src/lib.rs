//! Harvester core: pure lifecycle state machine for the harvesting pipeline.
mod effect;
mod msg;
mod source;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::{Msg, WorkerTally};
pub use source::{parse_url_line, parse_url_lines};
pub use state::{Phase, PipelineState};
pub use update::update;
pub use view_model::RunSummary;
