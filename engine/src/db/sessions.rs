/// SQLite session store
///
/// Sessions live in `sessions`, their turns in `turns` keyed by
/// `(session_id, seq)`. Timestamps are RFC 3339 strings with nanosecond
/// precision so they read back exactly as written.
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sdk::errors::EngineError;
use sdk::types::{Session, Turn, TurnRole};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::session::{SessionStore, SessionSummary};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::Database(e.to_string())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EngineError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn turn_from_row(row: &SqliteRow) -> Result<Turn, EngineError> {
    let role: String = row.try_get("role").map_err(db_err)?;
    let timestamp: String = row.try_get("timestamp").map_err(db_err)?;

    Ok(Turn {
        role: TurnRole::parse(&role)
            .ok_or_else(|| EngineError::Database(format!("Unknown turn role '{}'", role)))?,
        persona_name: row.try_get("persona_name").map_err(db_err)?,
        text: row.try_get("text").map_err(db_err)?,
        timestamp: parse_ts(&timestamp)?,
    })
}

/// Claim the write lock and check that `id` names an open session.
///
/// The first statement of the transaction is a write, so SQLite takes the
/// lock up front and a busy writer is waited on instead of failing the
/// upgrade from a read snapshot.
async fn lock_open(conn: &mut SqliteConnection, id: &str) -> Result<(), EngineError> {
    let touched = sqlx::query("UPDATE sessions SET discarded_at = NULL WHERE id = ? AND discarded_at IS NULL")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?
        .rows_affected();

    if touched == 1 {
        return Ok(());
    }

    let discarded: Option<(Option<String>,)> =
        sqlx::query_as("SELECT discarded_at FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

    Err(match discarded {
        Some(_) => EngineError::SessionDiscarded(id.to_string()),
        None => EngineError::SessionNotFound(id.to_string()),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self) -> Result<Session, EngineError> {
        let session = Session::new();

        sqlx::query("INSERT INTO sessions (id, created_at) VALUES (?, ?)")
            .bind(&session.id)
            .bind(format_ts(&session.created_at))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        debug!("Created session {}", session.id);
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, EngineError> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT created_at, discarded_at FROM sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let created_at = match row {
            None => return Err(EngineError::SessionNotFound(id.to_string())),
            Some((_, Some(_))) => return Err(EngineError::SessionDiscarded(id.to_string())),
            Some((created_at, None)) => parse_ts(&created_at)?,
        };

        let rows = sqlx::query(
            "SELECT role, persona_name, text, timestamp FROM turns WHERE session_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let turns = rows
            .iter()
            .map(turn_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Session {
            id: id.to_string(),
            turns,
            created_at,
        })
    }

    async fn append(&self, id: &str, turns: &[Turn]) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        lock_open(&mut tx, id).await?;

        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq) + 1, 0) FROM turns WHERE session_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;

        for (offset, turn) in turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO turns (session_id, seq, role, persona_name, text, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(next + offset as i64)
            .bind(turn.role.as_str())
            .bind(turn.persona_name.as_deref())
            .bind(&turn.text)
            .bind(format_ts(&turn.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        debug!("Appended {} turns to session {}", turns.len(), id);
        Ok(())
    }

    async fn discard(&self, id: &str) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        lock_open(&mut tx, id).await?;

        sqlx::query("UPDATE sessions SET discarded_at = ? WHERE id = ?")
            .bind(format_ts(&Utc::now()))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        debug!("Discarded session {}", id);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, EngineError> {
        let rows = sqlx::query(
            "SELECT s.id, s.created_at, COUNT(t.seq) AS turn_count, MAX(t.timestamp) AS last_activity
             FROM sessions s
             LEFT JOIN turns t ON t.session_id = s.id
             WHERE s.discarded_at IS NULL
             GROUP BY s.id, s.created_at
             ORDER BY s.created_at DESC
             LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at").map_err(db_err)?;
                let turn_count: i64 = row.try_get("turn_count").map_err(db_err)?;
                let last_activity: Option<String> =
                    row.try_get("last_activity").map_err(db_err)?;

                Ok(SessionSummary {
                    id: row.try_get("id").map_err(db_err)?,
                    created_at: parse_ts(&created_at)?,
                    turn_count: turn_count.max(0) as usize,
                    last_activity: last_activity.as_deref().map(parse_ts).transpose()?,
                })
            })
            .collect()
    }
}
