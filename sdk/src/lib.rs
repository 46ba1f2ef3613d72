//! Legal Mind SDK
//!
//! Shared types and errors for the Legal Mind engine and anything that talks
//! to it (CLI, channel adapters, persistence collaborators).

/// Error types and handling
pub mod errors;

/// Conversation and response types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, InvocationError, LegalMindErrorExt};
pub use types::{
    AggregatedResponse, ConfidenceLevel, QualityAssessment, Session, Turn, TurnRole,
};
