//! Persona Selector
//!
//! Keyword routing over the persona table. A query selects every specialist
//! whose trigger keywords occur in it (case-insensitive substring match), in
//! the table's static priority order. The coordinator, when it joins, always
//! comes last. With no matching specialist the default persona answers alone.
//!
//! This is a coarse heuristic: there is no relevance scoring, and ties are
//! settled by priority order only.

use std::sync::Arc;
use tracing::debug;

use crate::config::CoordinationPolicy;
use crate::personas::{Persona, PersonaTable};

#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    policy: CoordinationPolicy,
}

impl Selector {
    pub fn new(policy: CoordinationPolicy) -> Self {
        Self { policy }
    }

    /// Pick the personas that answer `query`, in invocation order.
    ///
    /// Never returns an empty list, whatever the input.
    pub fn select(&self, query: &str, table: &PersonaTable) -> Vec<Arc<Persona>> {
        let query_lower = query.to_lowercase();

        let mut selected: Vec<Arc<Persona>> = table
            .iter()
            .filter(|p| !p.is_coordinator() && p.is_triggered_by(&query_lower))
            .cloned()
            .collect();
        let matched = selected.len();

        if selected.is_empty() {
            selected.push(Arc::clone(table.default_persona()));
        }

        if let Some(coordinator) = table.coordinator() {
            let requested = coordinator.is_triggered_by(&query_lower);
            let coordinate = requested
                || match self.policy {
                    CoordinationPolicy::Always => matched >= 1,
                    CoordinationPolicy::Multi => matched >= 2,
                    CoordinationPolicy::Triggered => false,
                };
            if coordinate {
                selected.push(Arc::clone(coordinator));
            }
        }

        debug!(
            "Selected {:?} ({} trigger matches, policy {:?})",
            selected.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            matched,
            self.policy
        );

        selected
    }
}
