//! Quality Scorer
//!
//! Annotates an answer with a 1-10 score built from a handful of surface
//! features: section headings, list structure, citation-like references,
//! body length against a word band, and whether the answer mentions the
//! significant words of the question.
//!
//! The score is illustrative. It has no statistical calibration and says
//! nothing about whether the legal analysis is correct. It exists so that
//! thin or unstructured answers are visible at a glance. Any "Quality Score"
//! a persona writes into its own answer is ignored.
//!
//! Every function here is total: any input, including the empty string,
//! produces a score in `1..=10`.

use regex::Regex;
use sdk::types::{ConfidenceLevel, QualityAssessment};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::config::QualityConfig;

const BASELINE: i32 = 5;
const MIN_SCORE: i32 = 1;
const MAX_SCORE: i32 = 10;

/// Query words shorter than this carry no meaning for coverage
const SIGNIFICANT_WORD_LEN: usize = 4;

static HEADING_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static LIST_PATTERN: OnceLock<Regex> = OnceLock::new();
static CITATION_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns match whole trimmed lines:
/// - Markdown headings: `## Analysis`
/// - Bold-only lines: `**Key Findings**`
/// - Short label lines: `Recommendations:`
fn heading_patterns() -> &'static Vec<Regex> {
    HEADING_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"^#{1,6}\s+\S").expect("Invalid markdown heading pattern"),
            Regex::new(r"^\*\*[^*]+\*\*:?$").expect("Invalid bold heading pattern"),
            Regex::new(r"^[A-Z][A-Za-z ]{2,40}:$").expect("Invalid label heading pattern"),
        ]
    })
}

fn list_pattern() -> &'static Regex {
    LIST_PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\d{1,3}[.)]|[a-z][.)]|[-*•])\s+\S").expect("Invalid list pattern")
    })
}

/// Patterns match:
/// - A word followed by a number in parentheses: `Regulation (2016)`
/// - Section references: `§ 5`
/// - US Code and Federal Regulations: `U.S.C.`, `C.F.R.`, `CFR`
/// - Treaty and regulation articles: `Article 6`
/// - Case names: `Smith v. Jones`
///
/// None of them span a line break.
fn citation_patterns() -> &'static Vec<Regex> {
    CITATION_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\b\w+[ \t]\(\d{1,4}\)").expect("Invalid parenthetical pattern"),
            Regex::new(r"§+[ \t]*\d+").expect("Invalid section pattern"),
            Regex::new(r"\b\d*[ \t]*U\.S\.C\.").expect("Invalid USC pattern"),
            Regex::new(r"\bC\.?F\.?R\b").expect("Invalid CFR pattern"),
            Regex::new(r"\bArt(?:icle|\.)[ \t]*\d+").expect("Invalid article pattern"),
            Regex::new(r"\b[A-Z][a-zA-Z]+[ \t]+v\.[ \t]+[A-Z]").expect("Invalid case pattern"),
        ]
    })
}

/// Surface features extracted from one answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextFeatures {
    pub has_headings: bool,
    pub has_lists: bool,
    /// Distinct citation-like strings
    pub citations: usize,
    /// Words outside heading lines
    pub body_words: usize,
    /// Significant query words, and how many of them the answer mentions
    pub query_terms: usize,
    pub query_terms_covered: usize,
}

impl TextFeatures {
    pub fn extract(text: &str, query: &str) -> Self {
        let mut features = Self::default();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if heading_patterns().iter().any(|re| re.is_match(trimmed)) {
                features.has_headings = true;
                continue;
            }
            if list_pattern().is_match(line) {
                features.has_lists = true;
            }
            features.body_words += trimmed
                .split_whitespace()
                .filter(|w| w.chars().any(char::is_alphanumeric))
                .count();
        }

        let mut hits = HashSet::new();
        for re in citation_patterns() {
            for m in re.find_iter(text) {
                hits.insert(m.as_str().trim().to_string());
            }
        }
        features.citations = hits.len();

        let text_words = words(text);
        let query_words: HashSet<String> = words(query)
            .into_iter()
            .filter(|w| w.chars().count() >= SIGNIFICANT_WORD_LEN)
            .collect();
        features.query_terms = query_words.len();
        features.query_terms_covered = query_words
            .iter()
            .filter(|w| text_words.contains(*w))
            .count();

        features
    }

    fn covers_query(&self) -> bool {
        self.query_terms > 0 && self.query_terms_covered * 2 >= self.query_terms
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Heuristic scorer with a configurable word band
#[derive(Debug, Clone)]
pub struct QualityScorer {
    min_words: usize,
    max_words: usize,
    far_min_words: usize,
    far_max_words: usize,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}

impl QualityScorer {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_words: config.min_words,
            max_words: config.max_words,
            far_min_words: config.far_min_words,
            far_max_words: config.far_max_words,
        }
    }

    /// Score `text` as an answer to `query`, in `1..=10`.
    pub fn score(&self, text: &str, query: &str) -> u8 {
        self.score_features(&TextFeatures::extract(text, query))
    }

    /// Score plus confidence label and improvement suggestions.
    pub fn assess(&self, text: &str, query: &str) -> QualityAssessment {
        let features = TextFeatures::extract(text, query);
        let score = self.score_features(&features);

        QualityAssessment {
            score,
            confidence: ConfidenceLevel::from_score(score),
            suggestions: self.suggestions(&features),
        }
    }

    fn in_band(&self, words: usize) -> bool {
        (self.min_words..=self.max_words).contains(&words)
    }

    fn far_outside(&self, words: usize) -> bool {
        words < self.far_min_words || words > self.far_max_words
    }

    fn score_features(&self, f: &TextFeatures) -> u8 {
        let mut score = BASELINE;

        if f.has_headings {
            score += 1;
        }
        if f.has_lists {
            score += 1;
        }
        if f.citations >= 1 {
            score += 1;
        }
        if f.citations >= 3 {
            score += 1;
        }
        if self.in_band(f.body_words) {
            score += 1;
        }
        if self.far_outside(f.body_words) {
            score -= 2;
        }
        if f.covers_query() {
            score += 1;
        }

        score.clamp(MIN_SCORE, MAX_SCORE) as u8
    }

    fn suggestions(&self, f: &TextFeatures) -> Vec<String> {
        let mut suggestions = Vec::new();

        if !f.has_headings {
            suggestions.push("Organize the answer under clear section headings".to_string());
        }
        if !f.has_lists {
            suggestions
                .push("Use numbered or bulleted lists for requirements and action items".to_string());
        }
        if f.citations == 0 {
            suggestions
                .push("Add specific legal citations and references to support the analysis".to_string());
        }
        if f.body_words < self.min_words {
            suggestions.push("Provide more detailed analysis and explanation".to_string());
        } else if f.body_words > self.max_words {
            suggestions.push("Consider condensing to focus on key points".to_string());
        }
        if f.query_terms > 0 && !f.covers_query() {
            suggestions.push("Address the specific question asked more directly".to_string());
        }

        if suggestions.is_empty() {
            suggestions.push("Analysis meets quality standards".to_string());
        }
        suggestions
    }
}
