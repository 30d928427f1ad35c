pub mod adapters;
pub mod pipeline;

pub use pipeline::{PipelineError, StepOutcome, TicketPipeline, TicketPipelineResult};
