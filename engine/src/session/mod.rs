//! Conversation session storage
//!
//! The orchestrator only talks to sessions through [`SessionStore`]. Two
//! implementations exist: [`InMemorySessionStore`] for one-shot use and
//! tests, and the SQLite-backed store in [`crate::db::sessions`].
//!
//! A session is either open or discarded. Discarding is final: `get` and
//! `append` on a discarded id fail with `SessionDiscarded`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::types::{Session, Turn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// One row of `legal-mind sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub turn_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionSummary {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            created_at: session.created_at,
            turn_count: session.len(),
            last_activity: session.turns.last().map(|t| t.timestamp),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short name for status output (`memory`, `sqlite`)
    fn kind(&self) -> &'static str;

    /// Open a new, empty session
    async fn create(&self) -> Result<Session, EngineError>;

    /// Load an open session with all its turns, oldest first
    async fn get(&self, id: &str) -> Result<Session, EngineError>;

    /// Append `turns` to an open session, preserving their order
    async fn append(&self, id: &str, turns: &[Turn]) -> Result<(), EngineError>;

    /// Move a session to the discarded state
    async fn discard(&self, id: &str) -> Result<(), EngineError>;

    /// Open sessions, newest first
    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, EngineError>;
}

/// Open sessions keep their turns. A discarded id keeps nothing but its
/// place in `discarded`.
#[derive(Default)]
struct Sessions {
    open: HashMap<String, Session>,
    discarded: HashSet<String>,
}

impl Sessions {
    fn closed(&self, id: &str) -> EngineError {
        if self.discarded.contains(id) {
            EngineError::SessionDiscarded(id.to_string())
        } else {
            EngineError::SessionNotFound(id.to_string())
        }
    }
}

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Sessions>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create(&self) -> Result<Session, EngineError> {
        let session = Session::new();
        debug!("Created session {}", session.id);
        self.sessions
            .write()
            .await
            .open
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, EngineError> {
        let sessions = self.sessions.read().await;
        sessions
            .open
            .get(id)
            .cloned()
            .ok_or_else(|| sessions.closed(id))
    }

    async fn append(&self, id: &str, turns: &[Turn]) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        match sessions.open.get_mut(id) {
            Some(session) => {
                session.append(turns.iter().cloned());
                Ok(())
            }
            None => Err(sessions.closed(id)),
        }
    }

    async fn discard(&self, id: &str) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        if sessions.open.remove(id).is_none() {
            return Err(sessions.closed(id));
        }
        sessions.discarded.insert(id.to_string());
        debug!("Discarded session {}", id);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, EngineError> {
        let sessions = self.sessions.read().await;
        let mut open: Vec<SessionSummary> = sessions.open.values().map(SessionSummary::of).collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open.truncate(limit);
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_preserves_order() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();

        store
            .append(&session.id, &[Turn::user("one"), Turn::persona("ResearchAgent", "two")])
            .await
            .unwrap();
        store.append(&session.id, &[Turn::user("three")]).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap();
        let texts: Vec<&str> = loaded.turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(EngineError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.append("nope", &[]).await,
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn discarded_session_is_closed_for_good() {
        let store = InMemorySessionStore::new();
        let session = store.create().await.unwrap();
        store.discard(&session.id).await.unwrap();

        assert!(matches!(
            store.get(&session.id).await,
            Err(EngineError::SessionDiscarded(_))
        ));
        assert!(matches!(
            store.append(&session.id, &[Turn::user("late")]).await,
            Err(EngineError::SessionDiscarded(_))
        ));
        assert!(matches!(
            store.discard(&session.id).await,
            Err(EngineError::SessionDiscarded(_))
        ));
        assert!(store.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn discard_drops_the_turns() {
        let store = InMemorySessionStore::new();
        let kept = store.create().await.unwrap();
        let dropped = store.create().await.unwrap();
        store
            .append(&dropped.id, &[Turn::user("privileged"), Turn::persona("ResearchAgent", "advice")])
            .await
            .unwrap();
        store.append(&kept.id, &[Turn::user("keep me")]).await.unwrap();

        store.discard(&dropped.id).await.unwrap();

        let sessions = store.sessions.read().await;
        assert!(!sessions.open.contains_key(&dropped.id));
        assert!(sessions.discarded.contains(&dropped.id));
        assert_eq!(sessions.open[&kept.id].len(), 1);
        drop(sessions);

        let listed = store.list(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
    }

    #[tokio::test]
    async fn list_respects_limit() {
        let store = InMemorySessionStore::new();
        for _ in 0..3 {
            store.create().await.unwrap();
        }
        assert_eq!(store.list(2).await.unwrap().len(), 2);
        assert_eq!(store.list(10).await.unwrap().len(), 3);
    }
}
