//! Conductor System
//!
//! Routes a query to personas, chains their answers, and scores the result.

pub mod evaluator;
pub mod orchestrator;
pub mod selector;
pub mod synthesizer;

pub use evaluator::{QualityScorer, TextFeatures};
pub use orchestrator::Orchestrator;
pub use selector::Selector;
pub use synthesizer::Synthesizer;
