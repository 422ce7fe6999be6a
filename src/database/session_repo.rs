use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::connection::DatabaseManager;
use crate::error::{RagSessionError, Result};
use crate::models::{QaTurn, Session, SessionId};
use crate::utils::{format_timestamp, parse_timestamp};

/// Undecoded `sessions` row
#[derive(Debug, Clone)]
struct SessionRecord {
    summary_all: String,
    summary_recent: String,
    created_at: String,
    updated_at: String,
    last_accessed_at: String,
}

/// Undecoded `qa_turns` row
#[derive(Debug, Clone)]
struct TurnRecord {
    turn_id: i64,
    user_query: String,
    answer: String,
    created_at: String,
    embedding: Vec<u8>,
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> std::result::Result<Vec<f32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn storage_error(err: anyhow::Error) -> RagSessionError {
    RagSessionError::storage(format!("{err:#}"))
}

pub struct SessionRepository {
    db: DatabaseManager,
}

impl SessionRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Load a session and its turns.
    ///
    /// Rows that exist but cannot be decoded yield `RagSessionError::Corrupt`.
    pub fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let raw = self
            .db
            .with_connection(|conn| {
                let record = conn
                    .query_row(
                        "SELECT summary_all, summary_recent, created_at, updated_at, last_accessed_at
                         FROM sessions WHERE id = ?1",
                        [id.as_str()],
                        |row| {
                            Ok(SessionRecord {
                                summary_all: row.get(0)?,
                                summary_recent: row.get(1)?,
                                created_at: row.get(2)?,
                                updated_at: row.get(3)?,
                                last_accessed_at: row.get(4)?,
                            })
                        },
                    )
                    .optional()?;

                let Some(record) = record else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT turn_id, user_query, answer, created_at, embedding
                     FROM qa_turns WHERE session_id = ?1 ORDER BY turn_id",
                )?;
                let turns = stmt
                    .query_map([id.as_str()], |row| {
                        Ok(TurnRecord {
                            turn_id: row.get(0)?,
                            user_query: row.get(1)?,
                            answer: row.get(2)?,
                            created_at: row.get(3)?,
                            embedding: row.get(4)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(Some((record, turns)))
            })
            .map_err(storage_error)?;

        match raw {
            Some((record, turns)) => Self::decode(id, record, turns).map(Some),
            None => Ok(None),
        }
    }

    fn decode(id: &SessionId, record: SessionRecord, turns: Vec<TurnRecord>) -> Result<Session> {
        let corrupt = |message: String| RagSessionError::corrupt(id.to_string(), message);
        let timestamp = |field: &str, value: &str| {
            parse_timestamp(value).map_err(|e| corrupt(format!("{field}: {e}")))
        };

        let created_at = timestamp("created_at", &record.created_at)?;
        let updated_at = timestamp("updated_at", &record.updated_at)?;
        let last_accessed_at = timestamp("last_accessed_at", &record.last_accessed_at)?;

        let mut decoded = Vec::with_capacity(turns.len());
        for turn in turns {
            let turn_created_at = timestamp("qa_turns.created_at", &turn.created_at)?;
            let embedding = decode_embedding(&turn.embedding)
                .map_err(|e| corrupt(format!("turn {}: {e}", turn.turn_id)))?;
            decoded.push(
                QaTurn::new(turn.turn_id, turn.user_query, turn.answer, turn_created_at)
                    .with_embedding(embedding),
            );
        }

        Ok(Session::restore(
            id.clone(),
            created_at,
            updated_at,
            last_accessed_at,
            record.summary_all,
            record.summary_recent,
            decoded,
        ))
    }

    /// Upsert the session row and replace its whole turn set
    pub fn save(&self, session: &Session) -> Result<()> {
        self.db
            .with_transaction(|conn| {
                conn.execute(
                    "INSERT INTO sessions (id, summary_all, summary_recent, created_at, updated_at, last_accessed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        summary_all = excluded.summary_all,
                        summary_recent = excluded.summary_recent,
                        updated_at = excluded.updated_at,
                        last_accessed_at = excluded.last_accessed_at",
                    params![
                        session.id.as_str(),
                        session.summary_all,
                        session.summary_recent,
                        format_timestamp(&session.created_at),
                        format_timestamp(&session.updated_at),
                        format_timestamp(&session.last_accessed_at),
                    ],
                )?;

                conn.execute(
                    "DELETE FROM qa_turns WHERE session_id = ?1",
                    [session.id.as_str()],
                )?;

                let mut stmt = conn.prepare(
                    "INSERT INTO qa_turns (session_id, turn_id, user_query, answer, created_at, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for turn in session.turns() {
                    stmt.execute(params![
                        session.id.as_str(),
                        turn.turn_id,
                        turn.user_query,
                        turn.answer,
                        format_timestamp(&turn.created_at),
                        encode_embedding(turn.embedding()),
                    ])?;
                }

                Ok(())
            })
            .map_err(storage_error)
    }

    /// Update `last_accessed_at`; returns false when the session is not stored
    pub fn touch(&self, id: &SessionId, last_accessed_at: DateTime<Utc>) -> Result<bool> {
        self.db
            .with_connection(|conn| {
                let rows = conn.execute(
                    "UPDATE sessions SET last_accessed_at = ?2 WHERE id = ?1",
                    params![id.as_str(), format_timestamp(&last_accessed_at)],
                )?;
                Ok(rows > 0)
            })
            .map_err(storage_error)
    }

    pub fn delete(&self, id: &SessionId) -> Result<bool> {
        self.db
            .with_connection(|conn| {
                let rows = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.as_str()])?;
                Ok(rows > 0)
            })
            .map_err(storage_error)
    }

    /// Delete every session last accessed at or before `cutoff`, except `exclude`.
    ///
    /// Rows whose timestamp cannot be parsed are deleted as well.
    pub fn purge_expired(&self, cutoff: DateTime<Utc>, exclude: &[SessionId]) -> Result<usize> {
        self.db
            .with_transaction(|conn| {
                let mut stmt = conn.prepare("SELECT id, last_accessed_at FROM sessions")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut purged = 0;
                for (id, last_accessed_at) in rows {
                    if exclude.iter().any(|excluded| excluded.as_str() == id) {
                        continue;
                    }
                    let expired = match parse_timestamp(&last_accessed_at) {
                        Ok(at) => at <= cutoff,
                        Err(_) => true,
                    };
                    if expired {
                        purged += conn.execute("DELETE FROM sessions WHERE id = ?1", [&id])?;
                    }
                }
                Ok(purged)
            })
            .map_err(storage_error)
    }

    pub fn list_ids(&self) -> Result<Vec<SessionId>> {
        let ids = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY last_accessed_at DESC")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(ids)
            })
            .map_err(storage_error)?;

        Ok(ids.into_iter().filter_map(|id| SessionId::new(id).ok()).collect())
    }

    pub fn count(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
            })
            .map(|count| count.max(0) as usize)
            .map_err(storage_error)
    }
}
