//! Game session lifecycle: one active session per user and game type.
//!
//! Starts for the same `(user, game_type)` are serialized on an async mutex
//! and then re-checked inside an IMMEDIATE SQLite transaction, with a partial
//! unique index on active sessions as the last line. Completion writes the
//! session row and the user's statistics in one transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::core::session::SessionStatus;
use crate::db::queries::{self, GameSessionRow, SessionCompletion, UserGameStatsRow, UserStatsRow};
use crate::db::{Database, DbError};

/// Active sessions older than this are abandoned at startup.
pub const SESSION_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::NotFound(what) => SessionError::NotFound(what),
            DbError::InvalidState(msg) => SessionError::InvalidState(msg),
            other => SessionError::Db(other),
        }
    }
}

/// What to record when a session ends.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub score: Option<u8>,
    pub evidence: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session: GameSessionRow,
    /// False when an already active session was returned.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub overall: Option<UserStatsRow>,
    pub by_game_type: Vec<UserGameStatsRow>,
}

type SessionKey = (String, String);

pub struct GameSessionManager {
    db: Arc<Database>,
    locks: DashMap<SessionKey, Arc<Mutex<()>>>,
}

impl GameSessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: DashMap::new(),
        }
    }

    fn key_lock(&self, user_id: &str, game_type: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((user_id.to_string(), game_type.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start (or resume) the active session and keep the key locked until the
    /// returned guard is dropped, so callers can finish setting the session up
    /// before a concurrent start can observe it.
    pub async fn begin_exclusive(
        &self,
        user_id: &str,
        game_type: &str,
    ) -> Result<(SessionStart, OwnedMutexGuard<()>), SessionError> {
        let guard = self.key_lock(user_id, game_type).lock_owned().await;

        let new_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let (session, created) =
            queries::find_or_create_active_session(&self.db, &new_id, user_id, game_type, &now)?;

        if created {
            tracing::info!(session_id = %session.id, user_id, game_type, "game session started");
        } else {
            tracing::debug!(session_id = %session.id, user_id, game_type, "resuming active game session");
        }
        Ok((SessionStart { session, created }, guard))
    }

    pub async fn start_session(
        &self,
        user_id: &str,
        game_type: &str,
    ) -> Result<SessionStart, SessionError> {
        let (start, _guard) = self.begin_exclusive(user_id, game_type).await?;
        Ok(start)
    }

    pub fn end_session(
        &self,
        session_id: &str,
        outcome: SessionOutcome,
    ) -> Result<GameSessionRow, SessionError> {
        self.end_session_at(session_id, outcome, Utc::now())
    }

    pub fn end_session_at(
        &self,
        session_id: &str,
        outcome: SessionOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<GameSessionRow, SessionError> {
        let session = queries::get_session(&self.db, session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.status != SessionStatus::Active.as_str() {
            return Err(SessionError::InvalidState(format!(
                "session {session_id} is already {}",
                session.status
            )));
        }

        let evidence_json = outcome.evidence.as_ref().map(|v| v.to_string());
        let completion = SessionCompletion {
            session_id: session_id.to_string(),
            ended_at: ended_at.to_rfc3339(),
            duration_minutes: elapsed_minutes(&session.started_at, ended_at),
            score: outcome.score.map(i64::from),
            evidence_json,
        };
        let updated = queries::complete_session(&self.db, &completion)?;

        self.release_idle_locks();
        tracing::info!(
            session_id,
            duration_minutes = completion.duration_minutes,
            score = ?completion.score,
            "game session completed"
        );
        Ok(updated)
    }

    /// Mark an active session abandoned. Stats are untouched.
    pub fn abandon_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let abandoned =
            queries::abandon_session(&self.db, session_id, &Utc::now().to_rfc3339())?;
        if abandoned {
            tracing::info!(session_id, "game session abandoned");
        }
        Ok(abandoned)
    }

    pub fn active_session(
        &self,
        user_id: &str,
        game_type: &str,
    ) -> Result<Option<GameSessionRow>, SessionError> {
        Ok(queries::get_active_session(&self.db, user_id, game_type)?)
    }

    pub fn get_session(&self, session_id: &str) -> Result<GameSessionRow, SessionError> {
        queries::get_session(&self.db, session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<GameSessionRow>, SessionError> {
        Ok(queries::list_sessions_for_user(&self.db, user_id)?)
    }

    pub fn user_stats(&self, user_id: &str) -> Result<UserStats, SessionError> {
        Ok(UserStats {
            user_id: user_id.to_string(),
            overall: queries::get_user_stats(&self.db, user_id)?,
            by_game_type: queries::list_user_game_stats(&self.db, user_id)?,
        })
    }

    /// Abandon sessions left active by an earlier process. Returns their ids.
    pub fn abandon_stale_sessions(&self, now: DateTime<Utc>) -> Result<Vec<String>, SessionError> {
        let stale_after = chrono::Duration::seconds(SESSION_STALE_AFTER.as_secs() as i64);
        let cutoff = (now - stale_after).to_rfc3339();
        Ok(queries::abandon_sessions_started_before(
            &self.db,
            &cutoff,
            &now.to_rfc3339(),
        )?)
    }

    fn release_idle_locks(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Whole minutes between `started_at` and `ended_at`, rounded to nearest and
/// never negative. An unparseable start counts as zero.
pub fn elapsed_minutes(started_at: &str, ended_at: DateTime<Utc>) -> i64 {
    let started = match DateTime::parse_from_rfc3339(started_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!("unparseable session start {started_at}: {e}");
            return 0;
        }
    };
    let seconds = (ended_at - started).num_seconds().max(0);
    (seconds as f64 / 60.0).round() as i64
}
