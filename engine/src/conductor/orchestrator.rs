//! Orchestrator
//!
//! The controller a front end talks to. It answers one query in four steps,
//! after optionally scrubbing personal data from it:
//! 1. Load the session from the injected [`SessionStore`]
//! 2. Select personas for the query
//! 3. Synthesize their answers
//! 4. Persist the new turns
//!
//! Sessions are independent, so any number of `ask` calls on different
//! sessions may run at once. Two concurrent calls on the *same* session
//! both see the history as it was when they started.

use sdk::errors::EngineError;
use sdk::types::AggregatedResponse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentInvoker;
use crate::conductor::evaluator::QualityScorer;
use crate::conductor::selector::Selector;
use crate::conductor::synthesizer::Synthesizer;
use crate::config::CoordinationPolicy;
use crate::personas::PersonaTable;
use crate::secrets::PiiScrubber;
use crate::session::SessionStore;

pub struct Orchestrator {
    personas: Arc<PersonaTable>,
    store: Arc<dyn SessionStore>,
    selector: Selector,
    synthesizer: Synthesizer,
    scorer: QualityScorer,
    scrubber: Option<PiiScrubber>,
}

impl Orchestrator {
    pub fn new(
        personas: Arc<PersonaTable>,
        invoker: Arc<dyn AgentInvoker>,
        store: Arc<dyn SessionStore>,
        policy: CoordinationPolicy,
        scorer: QualityScorer,
    ) -> Self {
        Self {
            personas,
            store,
            selector: Selector::new(policy),
            synthesizer: Synthesizer::new(invoker, scorer.clone()),
            scorer,
            scrubber: None,
        }
    }

    /// Scrub every query with `scrubber` before it is sent or stored
    pub fn with_scrubber(mut self, scrubber: PiiScrubber) -> Self {
        self.scrubber = Some(scrubber);
        self
    }

    pub fn personas(&self) -> &PersonaTable {
        &self.personas
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    /// Open a new conversation and return its id
    pub async fn new_session(&self) -> Result<String, EngineError> {
        let session = self.store.create().await?;
        info!("Opened session {}", session.id);
        Ok(session.id)
    }

    /// Close a conversation for good
    pub async fn discard(&self, session_id: &str) -> Result<(), EngineError> {
        self.store.discard(session_id).await?;
        info!("Discarded session {}", session_id);
        Ok(())
    }

    /// Answer `query` within the session `session_id`.
    ///
    /// # Errors
    ///
    /// - `EmptyQuery` for a blank query, or one left blank by scrubbing
    /// - `SessionNotFound` / `SessionDiscarded` from the store
    /// - `Invocation` or `Cancelled` from synthesis; the stored session is
    ///   left untouched
    pub async fn ask(
        &self,
        session_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResponse, EngineError> {
        let scrubbed;
        let query = match &self.scrubber {
            Some(scrubber) => {
                let report = scrubber.scrub(query);
                if !report.is_clean() {
                    warn!(
                        "Scrubbed {} sensitive items ({}) from query in session {}",
                        report.detected.len(),
                        report.kinds(),
                        session_id
                    );
                }
                scrubbed = report.text;
                scrubbed.as_str()
            }
            None => query,
        };

        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let mut session = self.store.get(session_id).await?;
        let committed = session.len();

        let selected = self.selector.select(query, &self.personas);
        debug!(
            "Session {} ({} prior turns): {} personas selected",
            session_id,
            committed,
            selected.len()
        );

        let response = self
            .synthesizer
            .synthesize(&selected, query, &mut session, cancel)
            .await?;

        self.store
            .append(session_id, &session.turns[committed..])
            .await?;

        Ok(response)
    }
}
