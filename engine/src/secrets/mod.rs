//! API key lookup, log scrubbing and query privacy.
//!
//! Provider keys are read from environment variables named in the config
//! and held as [`SecretString`]. Anything echoed back by a provider (error
//! bodies, status messages) goes through [`scrub`] before it is logged or
//! wrapped in an error. Personal data in user queries is handled by
//! [`PiiScrubber`].

pub mod pii;
pub mod string;

pub use pii::{PiiKind, PiiScrubber, ScrubMode, ScrubReport};
pub use string::SecretString;

use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Regex patterns for detecting common secret formats.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9]{20,}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
/// - Azure `api-key` values echoed in headers or JSON
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
            Regex::new(r#"(?i)api[-_]key["']?\s*[:=]\s*["']?[A-Za-z0-9]{20,}"#)
                .expect("Invalid api-key pattern"),
        ]
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`.
///
/// # Examples
///
/// ```
/// use legal_mind_engine::secrets::scrub;
///
/// let scrubbed = scrub("My API key is sk-1234567890abcdefghij");
/// assert_eq!(scrubbed, "My API key is [REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}

/// Read an API key from the environment variable `var`.
///
/// # Errors
///
/// `EngineError::Config` when the variable is unset or blank. The message
/// names the variable, never its value.
pub fn api_key_from_env(var: &str) -> Result<SecretString, EngineError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::new(value.trim())),
        _ => Err(EngineError::Config(format!(
            "Environment variable {} is not set",
            var
        ))),
    }
}
