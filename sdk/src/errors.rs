//! Error types and handling
//!
//! This module provides the error types shared by the Legal Mind engine and
//! its front ends. All errors implement the `LegalMindErrorExt` trait which
//! provides user-facing hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API keys or raw provider credentials. Provider
//! response bodies are scrubbed by the engine before they reach an error.

use thiserror::Error;

/// Trait for Legal Mind error extensions
///
/// Channel adapters and the CLI use this to turn an error into something
/// that can be shown to an end user.
pub trait LegalMindErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the caller. Non-recoverable
    /// errors need a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Failure of a single remote completion call.
///
/// Raised by chat providers and the agent invocation client. Never retried
/// internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Completion timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },
}

impl LegalMindErrorExt for InvocationError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Authentication(_) => "The model provider rejected the API key. Check your configuration",
            Self::RateLimited(_) => "The model provider is busy. Please wait a moment and try again",
            Self::Timeout(_) => "The model provider took too long to respond. Please try again",
            _ => "The legal analysis service could not be reached. Please try again",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Authentication(_))
    }
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: invalid config, empty or inconsistent persona table
/// - **Invocation**: a persona call failed ([`InvocationError`])
/// - **Session**: unknown or discarded session
/// - **Request**: empty query, cancelled request
/// - **Storage**: SQLite and filesystem failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, InvocationError, LegalMindErrorExt};
///
/// let error = EngineError::Invocation(InvocationError::Timeout(30));
/// assert!(error.user_hint().contains("try again"));
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::EmptyPersonaTable;
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persona table is empty")]
    EmptyPersonaTable,

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    // Invocation errors
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    // Request errors
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Request cancelled")]
    Cancelled,

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session discarded: {0}")]
    SessionDiscarded(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns the underlying invocation failure, if any.
    pub fn as_invocation(&self) -> Option<&InvocationError> {
        match self {
            Self::Invocation(e) => Some(e),
            _ => None,
        }
    }
}

impl LegalMindErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::EmptyPersonaTable => "No personas are configured. Check the [personas] section",
            Self::UnknownPersona(_) => "A configured persona name does not exist",

            Self::Invocation(e) => e.user_hint(),

            Self::EmptyQuery => "Please enter a question",
            Self::Cancelled => "Request cancelled",

            Self::SessionNotFound(_) => "No conversation with that id. Start a new one",
            Self::SessionDiscarded(_) => "That conversation was closed. Start a new one",

            Self::Database(_) => "Conversation storage failed. Check the data directory",
            Self::Serialization(_) => "Stored conversation data is corrupted",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::EmptyPersonaTable | Self::UnknownPersona(_) => false,
            Self::Invocation(e) => e.is_recoverable(),
            _ => true,
        }
    }
}
