pub mod error;
pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod stage;

pub use error::GenerationError;
pub use orchestrator::{
    BillingContext, GenerationOrchestrator, StartResult, can_start_full_generation_with_references,
    check_full_generation_preconditions,
};
pub use stage::{GenerationPipeline, Stage};
