//! Configuration management
//!
//! This module handles loading, validation, and management of the Legal Mind
//! configuration. Configuration is stored in TOML format at
//! ~/.legal-mind/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Chat-completion provider and its connection settings
//! - **personas**: Persona priority, default and coordinator names, the
//!   trigger keyword table, history window and coordination policy
//! - **session**: Which session store backs conversations
//! - **quality**: Word-count band used by the quality scorer
//! - **privacy**: Optional scrubbing of personal and case data from queries
//!
//! # Path Expansion
//!
//! `~` in `core.data_dir` and `personas.prompt_dir` is expanded to the
//! user's home directory. The data directory is created if missing.
//!
//! # Examples
//!
//! ```no_run
//! use legal_mind_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Provider: {}", config.llm.provider);
//! println!("Default persona: {}", config.personas.default_persona);
//! # Ok(())
//! # }
//! ```

use crate::secrets::ScrubMode;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Persona names of the built-in legal team, in selection priority order.
pub const POLICY_ANALYST: &str = "PolicyAnalyst";
pub const COMPLIANCE_EXPERT: &str = "ComplianceExpert";
pub const RESEARCH_AGENT: &str = "ResearchAgent";
pub const COMPARATIVE_ANALYST: &str = "ComparativeAnalyst";
pub const COORDINATOR: &str = "Coordinator";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    pub llm: LLMConfig,

    /// Persona selection and synthesis
    #[serde(default)]
    pub personas: PersonasConfig,

    /// Conversation storage
    #[serde(default)]
    pub session: SessionConfig,

    /// Quality scorer tuning
    #[serde(default)]
    pub quality: QualityConfig,

    /// Personal data handling
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Active provider (openai, azure_openai, ollama)
    pub provider: String,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Azure OpenAI provider settings
    #[serde(default)]
    pub azure_openai: AzureOpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

/// Azure OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureOpenAIConfig {
    /// Resource endpoint, e.g. https://my-resource.openai.azure.com
    #[serde(default)]
    pub endpoint: String,

    /// Deployment name of the chat model
    #[serde(default = "default_azure_deployment")]
    pub deployment: String,

    #[serde(default = "default_azure_api_version")]
    pub api_version: String,

    /// Environment variable holding the API key
    #[serde(default = "default_azure_key_env")]
    pub api_key_env: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// When the coordinator persona joins a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationPolicy {
    /// Whenever at least one specialist trigger matched
    #[default]
    Always,
    /// Only when two or more specialists matched
    Multi,
    /// Only when one of the coordinator's own triggers matched
    Triggered,
}

/// Persona configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonasConfig {
    /// Persona used when no trigger matches
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Persona that synthesizes specialist output (omit to disable)
    #[serde(default = "default_coordinator", skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,

    /// Static selection priority, highest first
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,

    /// Number of prior turns replayed into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub coordination: CoordinationPolicy,

    /// Directory with `<PersonaName>.md` template overrides (supports ~ expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_dir: Option<PathBuf>,

    /// Trigger keyword -> persona name
    #[serde(default = "default_triggers")]
    pub triggers: BTreeMap<String, String>,
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            default_persona: default_persona(),
            coordinator: default_coordinator(),
            priority: default_priority(),
            history_window: default_history_window(),
            coordination: CoordinationPolicy::default(),
            prompt_dir: None,
            triggers: default_triggers(),
        }
    }
}

/// Which backend stores sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub store: StoreKind,
}

/// Word-count band for the quality scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Below this the answer is penalized
    #[serde(default = "default_far_min_words")]
    pub far_min_words: usize,

    /// Above this the answer is penalized
    #[serde(default = "default_far_max_words")]
    pub far_max_words: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            max_words: default_max_words(),
            far_min_words: default_far_min_words(),
            far_max_words: default_far_max_words(),
        }
    }
}

/// Query privacy settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrivacyConfig {
    /// Scrub personal and case data from queries before they are sent or stored
    #[serde(default)]
    pub scrub_queries: bool,

    #[serde(default)]
    pub mode: ScrubMode,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.legal-mind")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_azure_deployment() -> String {
    "gpt-4o".to_string()
}

fn default_azure_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_azure_key_env() -> String {
    "AZURE_OPENAI_API_KEY".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_persona() -> String {
    RESEARCH_AGENT.to_string()
}

fn default_coordinator() -> Option<String> {
    Some(COORDINATOR.to_string())
}

fn default_priority() -> Vec<String> {
    [
        POLICY_ANALYST,
        COMPLIANCE_EXPERT,
        RESEARCH_AGENT,
        COMPARATIVE_ANALYST,
        COORDINATOR,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_history_window() -> usize {
    5
}

fn default_triggers() -> BTreeMap<String, String> {
    let table: [(&str, &[&str]); 5] = [
        (
            POLICY_ANALYST,
            &[
                "policy",
                "regulation",
                "regulatory",
                "guideline",
                "framework",
                "directive",
                "standard",
                "procedure",
                "protocol",
            ],
        ),
        (
            COMPLIANCE_EXPERT,
            &[
                "compliance",
                "compliant",
                "violation",
                "breach",
                "audit",
                "requirement",
                "obligation",
                "penalty",
                "enforcement",
                "risk assessment",
                "gdpr",
            ],
        ),
        (
            RESEARCH_AGENT,
            &["research", "precedent", "case law", "statute", "ruling"],
        ),
        (
            COMPARATIVE_ANALYST,
            &[
                "compare",
                "comparison",
                "difference",
                "similar",
                "jurisdiction",
                "cross-border",
                "international",
                "versus",
            ],
        ),
        (
            COORDINATOR,
            &["comprehensive", "detailed report", "full overview"],
        ),
    ];

    table
        .iter()
        .flat_map(|(persona, words)| {
            words
                .iter()
                .map(move |w| (w.to_string(), persona.to_string()))
        })
        .collect()
}

fn default_min_words() -> usize {
    40
}

fn default_max_words() -> usize {
    500
}

fn default_far_min_words() -> usize {
    10
}

fn default_far_max_words() -> usize {
    1000
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
        }
    }
}

impl Default for AzureOpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: default_azure_deployment(),
            api_version: default_azure_api_version(),
            api_key_env: default_azure_key_env(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.legal-mind/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before path expansion so the file keeps `~`
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.legal-mind/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".legal-mind").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig {
                provider: "openai".to_string(),
                timeout_secs: default_timeout_secs(),
                openai: OpenAIConfig::default(),
                azure_openai: AzureOpenAIConfig::default(),
                ollama: OllamaConfig::default(),
            },
            personas: PersonasConfig::default(),
            session: SessionConfig::default(),
            quality: QualityConfig::default(),
            privacy: PrivacyConfig::default(),
        }
    }

    /// Path of the SQLite session database
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("legal-mind.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, provider and numeric settings
    /// - Checks that every persona name referenced by the persona section
    ///   appears in the priority list
    /// - Expands ~ in paths and creates the data directory
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "azure_openai", "ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.validate_personas()?;

        let q = &self.quality;
        if !(q.far_min_words <= q.min_words
            && q.min_words <= q.max_words
            && q.max_words <= q.far_max_words)
        {
            return Err(EngineError::Config(
                "quality band must satisfy far_min_words <= min_words <= max_words <= far_max_words"
                    .to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        if let Some(dir) = &self.personas.prompt_dir {
            self.personas.prompt_dir = Some(expand_path(dir)?);
        }

        Ok(())
    }

    fn validate_personas(&self) -> Result<(), EngineError> {
        let p = &self.personas;

        if p.priority.is_empty() {
            return Err(EngineError::EmptyPersonaTable);
        }

        if p.history_window == 0 {
            return Err(EngineError::Config(
                "history_window must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &p.priority {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Persona '{}' listed twice in priority",
                    name
                )));
            }
        }

        if !seen.contains(p.default_persona.as_str()) {
            return Err(EngineError::UnknownPersona(p.default_persona.clone()));
        }

        if let Some(coordinator) = &p.coordinator {
            if !seen.contains(coordinator.as_str()) {
                return Err(EngineError::UnknownPersona(coordinator.clone()));
            }
            if coordinator == &p.default_persona {
                return Err(EngineError::Config(
                    "default_persona cannot be the coordinator".to_string(),
                ));
            }
        }

        for (trigger, persona) in &p.triggers {
            if trigger.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "Empty trigger keyword for persona '{}'",
                    persona
                )));
            }
            if !seen.contains(persona.as_str()) {
                return Err(EngineError::UnknownPersona(persona.clone()));
            }
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml(data_dir: &Path, extra: &str) -> String {
        format!(
            "[core]\ndata_dir = {:?}\n\n[llm]\nprovider = \"ollama\"\n\n{}",
            data_dir.to_string_lossy(),
            extra
        )
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.personas.default_persona, RESEARCH_AGENT);
        assert_eq!(config.personas.coordinator.as_deref(), Some(COORDINATOR));
        assert_eq!(config.personas.history_window, 5);
        assert_eq!(config.session.store, StoreKind::Sqlite);
        assert_eq!(
            config.personas.triggers.get("gdpr").map(String::as_str),
            Some(COMPLIANCE_EXPERT)
        );
        assert_eq!(
            config.personas.triggers.get("compare").map(String::as_str),
            Some(COMPARATIVE_ANALYST)
        );
    }

    #[test]
    fn test_default_priority_puts_coordinator_last() {
        let priority = default_priority();
        assert_eq!(priority.last().map(String::as_str), Some(COORDINATOR));
        assert_eq!(priority.len(), 5);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.llm.provider, deserialized.llm.provider);
        assert_eq!(config.personas.triggers, deserialized.personas.triggers);
        assert_eq!(config.personas.priority, deserialized.personas.priority);
        assert_eq!(
            config.personas.coordination,
            deserialized.personas.coordination
        );
    }

    #[test]
    fn test_minimal_file_gets_persona_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_toml(&minimal_toml(dir.path(), "")).unwrap();

        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.personas.priority, default_priority());
        assert_eq!(config.core.data_dir, dir.path());
    }

    #[test]
    fn test_custom_trigger_table() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "[personas]\ncoordination = \"multi\"\n\n[personas.triggers]\n\"data protection\" = \"ComplianceExpert\"\n";
        let config = Config::from_toml(&minimal_toml(dir.path(), extra)).unwrap();

        assert_eq!(config.personas.coordination, CoordinationPolicy::Multi);
        assert_eq!(config.personas.triggers.len(), 1);
        assert_eq!(
            config.personas.triggers.get("data protection").map(String::as_str),
            Some(COMPLIANCE_EXPERT)
        );
    }

    #[test]
    fn test_trigger_for_unknown_persona_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "[personas.triggers]\ntax = \"TaxAdvisor\"\n";
        let err = Config::from_toml(&minimal_toml(dir.path(), extra)).unwrap_err();

        assert!(matches!(err, EngineError::UnknownPersona(name) if name == "TaxAdvisor"));
    }

    #[test]
    fn test_empty_priority_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "[personas]\npriority = []\n";
        let err = Config::from_toml(&minimal_toml(dir.path(), extra)).unwrap_err();

        assert!(matches!(err, EngineError::EmptyPersonaTable));
    }

    #[test]
    fn test_invalid_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[core]\ndata_dir = {:?}\n\n[llm]\nprovider = \"watson\"\n",
            dir.path().to_string_lossy()
        );
        assert!(matches!(
            Config::from_toml(&toml),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_privacy_defaults_off() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_toml(&minimal_toml(dir.path(), "")).unwrap();

        assert!(!config.privacy.scrub_queries);
        assert_eq!(config.privacy.mode, ScrubMode::Replace);
    }

    #[test]
    fn test_privacy_section_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "[privacy]\nscrub_queries = true\nmode = \"redact\"\n";
        let config = Config::from_toml(&minimal_toml(dir.path(), extra)).unwrap();

        assert!(config.privacy.scrub_queries);
        assert_eq!(config.privacy.mode, ScrubMode::Redact);
    }

    #[test]
    fn test_inverted_quality_band_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let extra = "[quality]\nmin_words = 600\nmax_words = 500\n";
        assert!(Config::from_toml(&minimal_toml(dir.path(), extra)).is_err());
    }
}
