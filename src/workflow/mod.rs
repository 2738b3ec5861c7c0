pub mod dispatcher;
pub mod evaluator;
pub mod pipeline;

pub use dispatcher::{BatchReport, Dispatcher, JobOutcome, JobReport};
pub use evaluator::{Evaluator, RunState};
pub use pipeline::{Pipeline, PipelineReport};
