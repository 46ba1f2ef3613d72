use async_trait::async_trait;
use sdk::errors::InvocationError;
use sdk::types::Turn;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::llm::{ChatProvider, Message};
use crate::personas::Persona;

/// Calls one persona with a query and prior turns, returning its free text.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// `history` is the full running history, oldest first. Implementations
    /// decide how much of it reaches the model.
    async fn invoke(
        &self,
        persona: &Persona,
        query: &str,
        history: &[Turn],
    ) -> Result<String, InvocationError>;
}

/// Production invoker backed by a [`ChatProvider`].
///
/// Only the last `history_window` turns are rendered into the prompt. Each
/// call is bounded by `timeout` and never retried.
pub struct AgentClient {
    provider: Box<dyn ChatProvider>,
    history_window: usize,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(provider: Box<dyn ChatProvider>, history_window: usize, timeout: Duration) -> Self {
        Self {
            provider,
            history_window: history_window.max(1),
            timeout,
        }
    }

    pub fn provider(&self) -> &dyn ChatProvider {
        self.provider.as_ref()
    }

    /// The tail of `history` that is replayed into the prompt
    fn window<'a>(&self, history: &'a [Turn]) -> &'a [Turn] {
        &history[history.len().saturating_sub(self.history_window)..]
    }

    /// Messages sent to the provider for this invocation
    pub fn build_messages(&self, persona: &Persona, query: &str, history: &[Turn]) -> Vec<Message> {
        vec![Message::user(persona.render(query, self.window(history)))]
    }
}

#[async_trait]
impl AgentInvoker for AgentClient {
    async fn invoke(
        &self,
        persona: &Persona,
        query: &str,
        history: &[Turn],
    ) -> Result<String, InvocationError> {
        let messages = self.build_messages(persona, query, history);

        debug!(
            "Invoking {} via {} (history: {} of {} turns, timeout: {}s)",
            persona.name,
            self.provider.name(),
            self.window(history).len(),
            history.len(),
            self.timeout.as_secs()
        );

        let start = Instant::now();
        match timeout(self.timeout, self.provider.generate(&messages)).await {
            Ok(Ok(text)) => {
                info!(
                    "{} answered in {:.1}s ({} chars)",
                    persona.name,
                    start.elapsed().as_secs_f64(),
                    text.len()
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", persona.name, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "{} timed out after {}s",
                    persona.name,
                    self.timeout.as_secs()
                );
                Err(InvocationError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
