//! Response Synthesizer
//!
//! Runs the selected personas one after another and merges their answers.
//! Each persona sees the committed session history plus the outputs the
//! earlier personas produced for this query. A coordinator, when selected,
//! runs last on the combined specialist output, with only the committed
//! history as context, and its answer becomes the final text.
//!
//! The session is only touched after every invocation has succeeded: a
//! failed or cancelled query leaves it exactly as it was.

use sdk::errors::EngineError;
use sdk::types::{AggregatedResponse, Session, Turn};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentInvoker;
use crate::conductor::evaluator::QualityScorer;
use crate::personas::Persona;

pub struct Synthesizer {
    invoker: Arc<dyn AgentInvoker>,
    scorer: QualityScorer,
}

impl Synthesizer {
    pub fn new(invoker: Arc<dyn AgentInvoker>, scorer: QualityScorer) -> Self {
        Self { invoker, scorer }
    }

    /// Answer `query` with the `selected` personas, in order.
    ///
    /// On success the user turn and every persona turn are appended to
    /// `session`. On error nothing is appended.
    ///
    /// # Errors
    ///
    /// - `Invocation` when any persona call fails; remaining personas are skipped
    /// - `Cancelled` when `cancel` fires before or during a call
    pub async fn synthesize(
        &self,
        selected: &[Arc<Persona>],
        query: &str,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResponse, EngineError> {
        let start = Instant::now();

        let mut history: Vec<Turn> = session.turns.clone();
        let committed = history.len();
        let mut coordinator_output = None;

        for persona in selected {
            // The coordinator reads this query's outputs from its input, so
            // its history stops at the committed turns.
            let (input, context) = if persona.is_coordinator() {
                (coordination_input(&history[committed..], query), &history[..committed])
            } else {
                (query.to_string(), &history[..])
            };

            let text = self.invoke(persona, &input, context, cancel).await?;
            if persona.is_coordinator() {
                coordinator_output = Some(text.clone());
            }
            history.push(Turn::persona(persona.name.as_str(), text));
        }

        let turns = history.split_off(committed);
        let (synthesized_text, scored_text) = match coordinator_output {
            Some(text) => (text.clone(), text),
            None => merge_uncoordinated(&turns),
        };

        session.append(std::iter::once(Turn::user(query)).chain(turns.iter().cloned()));

        let quality = self.scorer.assess(&scored_text, query);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            "Synthesized answer from {} personas in {}ms (quality {}/10)",
            turns.len(),
            elapsed_ms,
            quality.score
        );

        Ok(AggregatedResponse {
            session_id: session.id.clone(),
            query: query.to_string(),
            turns,
            synthesized_text,
            quality_score: quality.score,
            quality,
            elapsed_ms,
        })
    }

    async fn invoke(
        &self,
        persona: &Persona,
        input: &str,
        history: &[Turn],
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if cancel.is_cancelled() {
            debug!("Cancelled before invoking {}", persona.name);
            return Err(EngineError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Cancelled while waiting for {}", persona.name);
                Err(EngineError::Cancelled)
            }
            result = self.invoker.invoke(persona, input, history) => {
                result.map_err(EngineError::from)
            }
        }
    }
}

/// Coordinator input: specialist outputs under headers, then the request
fn coordination_input(specialist_turns: &[Turn], query: &str) -> String {
    let mut input = sectioned(specialist_turns);
    if !input.is_empty() {
        input.push_str("\n\n");
    }
    input.push_str(
        "Based on the specialist analysis above, provide a comprehensive synthesis and final recommendations for: ",
    );
    input.push_str(query);
    input
}

/// Final text without a coordinator, plus the text the scorer sees.
///
/// A lone answer is returned as is. Several answers are joined under
/// persona headers, but the headers are left out of the scored text so
/// they earn no structure points.
fn merge_uncoordinated(turns: &[Turn]) -> (String, String) {
    match turns {
        [only] => (only.text.clone(), only.text.clone()),
        _ => {
            let raw = turns
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            (sectioned(turns), raw)
        }
    }
}

fn sectioned(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("## {}\n{}", t.speaker(), t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
