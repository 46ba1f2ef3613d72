//! Legal Mind Engine Library
//!
//! Multi-persona legal analysis: keyword routing to specialist personas,
//! sequential synthesis, and heuristic quality scoring. Used by the
//! `legal-mind` binary and integration tests.

/// Configuration management module
pub mod config;

/// API key handling and log scrubbing
pub mod secrets;

/// Database persistence module
pub mod db;

/// Chat-completion provider abstraction layer
pub mod llm;

/// Persona templates and the persona table
pub mod personas;

/// Agent invocation client
pub mod agent;

/// Session store abstraction
pub mod session;

/// Selection, synthesis and scoring
pub mod conductor;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
