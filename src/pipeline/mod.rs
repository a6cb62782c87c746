pub mod orchestrator;

pub use orchestrator::{Pipeline, ProcessOutcome};
