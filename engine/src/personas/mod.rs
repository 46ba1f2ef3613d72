//! Persona templates
//!
//! A persona is a named prompt template plus the trigger keywords that route
//! queries to it. The five built-in personas ship as Markdown resources
//! under `engine/prompts/`; a configured `prompt_dir` can override any of
//! them, or supply templates for personas the config adds.
//!
//! Templates are Markdown with optional YAML-style frontmatter
//! (`description:`) and the placeholders `{{name}}`, `{{history}}` and
//! `{{query}}`. The table is built once at startup and shared read-only
//! behind an `Arc`.

use sdk::errors::EngineError;
use sdk::types::Turn;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::{
    PersonasConfig, COMPARATIVE_ANALYST, COMPLIANCE_EXPERT, COORDINATOR, POLICY_ANALYST,
    RESEARCH_AGENT,
};

const BUILTIN_TEMPLATES: [(&str, &str); 5] = [
    (POLICY_ANALYST, include_str!("../../prompts/PolicyAnalyst.md")),
    (COMPLIANCE_EXPERT, include_str!("../../prompts/ComplianceExpert.md")),
    (RESEARCH_AGENT, include_str!("../../prompts/ResearchAgent.md")),
    (COMPARATIVE_ANALYST, include_str!("../../prompts/ComparativeAnalyst.md")),
    (COORDINATOR, include_str!("../../prompts/Coordinator.md")),
];

/// Whether a persona answers directly or synthesizes other answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaKind {
    Specialist,
    Coordinator,
}

impl std::fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Specialist => write!(f, "specialist"),
            Self::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// A named expert role. Immutable once the table is built.
#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub kind: PersonaKind,
    #[serde(skip)]
    pub template: String,
    /// Lowercased trigger keywords
    pub keyword_triggers: BTreeSet<String>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        kind: PersonaKind,
        triggers: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            template: template.into(),
            keyword_triggers: triggers.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_coordinator(&self) -> bool {
        self.kind == PersonaKind::Coordinator
    }

    /// Whether any trigger occurs in `query_lower` (already lowercased)
    pub fn is_triggered_by(&self, query_lower: &str) -> bool {
        self.keyword_triggers
            .iter()
            .any(|t| query_lower.contains(t.as_str()))
    }

    /// Fill the template with the query and prior turns.
    ///
    /// Placeholders are substituted in a single pass, so braces inside the
    /// query or history are never expanded.
    pub fn render(&self, query: &str, history: &[Turn]) -> String {
        let history_block = render_history(history);
        fill_placeholders(&self.template, |key| match key {
            "name" => Some(self.name.as_str()),
            "history" => Some(history_block.as_str()),
            "query" => Some(query),
            _ => None,
        })
    }
}

/// Format turns as prompt context, oldest first.
pub fn render_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let lines: Vec<String> = history
        .iter()
        .map(|t| format!("{}: {}", t.speaker(), t.text))
        .collect();

    format!("Previous conversation:\n{}", lines.join("\n"))
}

fn fill_placeholders<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match lookup(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Split optional `---` frontmatter from a Markdown template.
///
/// Returns `(description, body)`.
fn parse_template(content: &str) -> (Option<String>, String) {
    let normalized = content.trim_start_matches('\u{feff}');
    if !normalized.starts_with("---\n") && !normalized.starts_with("---\r\n") {
        return (None, normalized.trim().to_string());
    }

    let parts: Vec<&str> = normalized.splitn(3, "---").collect();
    if parts.len() < 3 {
        return (None, normalized.trim().to_string());
    }

    let description = parts[1].lines().find_map(|line| {
        line.trim()
            .strip_prefix("description:")
            .map(|rest| rest.trim().trim_matches('"').trim_matches('\'').to_string())
    });

    (description, parts[2].trim().to_string())
}

/// Immutable persona table, in static priority order.
#[derive(Debug)]
pub struct PersonaTable {
    personas: Vec<Arc<Persona>>,
    default_index: usize,
    coordinator_index: Option<usize>,
}

impl PersonaTable {
    /// Build a table from personas already in priority order.
    ///
    /// # Errors
    ///
    /// - `EmptyPersonaTable` if `personas` is empty
    /// - `UnknownPersona` if `default` or `coordinator` is not in the table
    /// - `Config` for duplicate names, a default that is also the
    ///   coordinator, or a template without a `{{query}}` placeholder
    pub fn new(
        personas: Vec<Persona>,
        default: &str,
        coordinator: Option<&str>,
    ) -> Result<Self, EngineError> {
        if personas.is_empty() {
            return Err(EngineError::EmptyPersonaTable);
        }

        let mut seen = BTreeSet::new();
        for p in &personas {
            if !seen.insert(p.name.as_str()) {
                return Err(EngineError::Config(format!("Duplicate persona '{}'", p.name)));
            }
            if !p.template.contains("{{query}}") {
                return Err(EngineError::Config(format!(
                    "Template for '{}' has no {{{{query}}}} placeholder",
                    p.name
                )));
            }
        }

        let position = |name: &str| personas.iter().position(|p| p.name == name);

        let default_index =
            position(default).ok_or_else(|| EngineError::UnknownPersona(default.to_string()))?;

        let coordinator_index = match coordinator {
            Some(name) => Some(
                position(name).ok_or_else(|| EngineError::UnknownPersona(name.to_string()))?,
            ),
            None => None,
        };

        if Some(default_index) == coordinator_index {
            return Err(EngineError::Config(
                "default persona must be a specialist".to_string(),
            ));
        }

        let personas = personas
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.kind = if Some(i) == coordinator_index {
                    PersonaKind::Coordinator
                } else {
                    PersonaKind::Specialist
                };
                Arc::new(p)
            })
            .collect();

        Ok(Self {
            personas,
            default_index,
            coordinator_index,
        })
    }

    /// Build the table described by the `[personas]` config section.
    ///
    /// Built-in templates are used unless `prompt_dir` holds a
    /// `<PersonaName>.md` file for that persona. Personas in `priority`
    /// without a built-in template must have such a file.
    pub async fn from_config(config: &PersonasConfig) -> Result<Self, EngineError> {
        let mut templates: HashMap<String, (Option<String>, String)> = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, raw)| (name.to_string(), parse_template(raw)))
            .collect();

        if let Some(dir) = &config.prompt_dir {
            for (name, parsed) in load_prompt_dir(dir, &config.priority).await? {
                info!("Using prompt override for {}", name);
                templates.insert(name, parsed);
            }
        }

        let mut triggers: HashMap<&str, Vec<String>> = HashMap::new();
        for (keyword, persona) in &config.triggers {
            triggers
                .entry(persona.as_str())
                .or_default()
                .push(keyword.clone());
        }

        let mut personas = Vec::with_capacity(config.priority.len());
        for name in &config.priority {
            let (description, template) = templates
                .remove(name)
                .ok_or_else(|| EngineError::UnknownPersona(name.clone()))?;

            let kind = if config.coordinator.as_deref() == Some(name.as_str()) {
                PersonaKind::Coordinator
            } else {
                PersonaKind::Specialist
            };

            let persona = Persona::new(
                name.clone(),
                template,
                kind,
                triggers.remove(name.as_str()).unwrap_or_default(),
            )
            .with_description(description.unwrap_or_default());

            debug!(
                "Persona {} ({}) with {} triggers",
                persona.name,
                persona.kind,
                persona.keyword_triggers.len()
            );
            personas.push(persona);
        }

        Self::new(
            personas,
            &config.default_persona,
            config.coordinator.as_deref(),
        )
    }

    /// All personas in priority order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Persona>> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Persona>> {
        self.personas.iter().find(|p| p.name == name)
    }

    /// Persona used when no trigger matches
    pub fn default_persona(&self) -> &Arc<Persona> {
        &self.personas[self.default_index]
    }

    pub fn coordinator(&self) -> Option<&Arc<Persona>> {
        self.coordinator_index.map(|i| &self.personas[i])
    }
}

/// Read `<PersonaName>.md` overrides for the names in `known`.
async fn load_prompt_dir(
    dir: &Path,
    known: &[String],
) -> Result<Vec<(String, (Option<String>, String))>, EngineError> {
    if !dir.is_dir() {
        warn!("Prompt directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !known.iter().any(|k| k == stem) {
            warn!("Ignoring prompt {}: no persona named {}", path.display(), stem);
            continue;
        }

        let content = fs::read_to_string(&path).await?;
        found.push((stem.to_string(), parse_template(&content)));
    }

    Ok(found)
}
