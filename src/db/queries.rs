use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types: flat structs that map directly to table columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GameSessionRow {
    pub id: String,
    pub user_id: String,
    pub game_type: String,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_minutes: Option<i64>,
    pub score: Option<i64>,
    pub evidence_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserStatsRow {
    pub user_id: String,
    pub games_played: i64,
    pub total_minutes: i64,
    pub scored_games: i64,
    pub total_score: i64,
    pub best_score: i64,
    pub average_score: f64,
    pub last_played_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserGameStatsRow {
    pub user_id: String,
    pub game_type: String,
    pub games_played: i64,
    pub scored_games: i64,
    pub total_score: i64,
    pub best_score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStateRow {
    pub session_id: String,
    pub state_json: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnRow {
    pub id: String,
    pub session_id: String,
    pub idx: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRow {
    pub session_id: String,
    pub overall: i64,
    pub rating: String,
    pub summary: String,
    pub breakdown_json: String,
    pub raw_text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: String,
    pub session_id: Option<String>,
    pub seq: i64,
    pub category: String,
    pub event_type: String,
    pub payload_json: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrgMemberRow {
    pub org_id: String,
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRow {
    pub id: String,
    pub org_id: String,
    pub game_type: String,
    pub due_at: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GameTypeBreakdownRow {
    pub game_type: String,
    pub completed: i64,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub games_played: i64,
    pub best_score: i64,
    pub average_score: f64,
}

/// Values written when a session completes.
#[derive(Debug, Clone)]
pub struct SessionCompletion {
    pub session_id: String,
    pub ended_at: String,
    pub duration_minutes: i64,
    pub score: Option<i64>,
    pub evidence_json: Option<String>,
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// User queries
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, email, display_name, role, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn insert_user(db: &Database, row: &UserRow) -> Result<(), DbError> {
    let conn = db.conn();
    insert_user_row(&conn, row)
}

/// Insert a user, counting existing users in the same write transaction.
/// The first user is always stored as `admin`. Later users are only written
/// when `authorized`; otherwise nothing changes and `None` is returned.
pub fn insert_user_bootstrapping(
    db: &Database,
    row: &UserRow,
    authorized: bool,
) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    if existing > 0 && !authorized {
        return Ok(None);
    }

    let mut row = row.clone();
    if existing == 0 {
        row.role = "admin".to_string();
    }
    insert_user_row(&tx, &row)?;
    tx.commit()?;
    Ok(Some(row))
}

fn insert_user_row(conn: &rusqlite::Connection, row: &UserRow) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO users (id, email, display_name, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.email,
            row.display_name,
            row.role,
            row.created_at,
            row.updated_at
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            DbError::Conflict(format!("email already registered: {}", row.email))
        } else {
            DbError::Sqlite(e)
        }
    })?;
    Ok(())
}

pub fn get_user(db: &Database, id: &str) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub fn get_user_by_email(db: &Database, email: &str) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            params![email],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub fn list_users(db: &Database) -> Result<Vec<UserRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY display_name COLLATE NOCASE ASC"
    ))?;
    let rows = stmt
        .query_map([], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns false when no user with `id` exists.
pub fn update_user(
    db: &Database,
    id: &str,
    display_name: &str,
    role: &str,
    updated_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE users SET display_name = ?2, role = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, display_name, role, updated_at],
    )?;
    Ok(changed > 0)
}

pub fn count_users_with_role(db: &Database, role: &str) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![role],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn delete_user_cascade(db: &Database, user_id: &str) -> Result<(), DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let owned = tx.query_row(
        "SELECT COUNT(*) FROM organizations WHERE created_by = ?1",
        params![user_id],
        |row| row.get::<_, i64>(0),
    )?;
    let authored = tx.query_row(
        "SELECT COUNT(*) FROM assignments WHERE created_by = ?1",
        params![user_id],
        |row| row.get::<_, i64>(0),
    )?;
    if owned > 0 || authored > 0 {
        return Err(DbError::Conflict(format!(
            "user {user_id} still owns {owned} organization(s) and {authored} assignment(s)"
        )));
    }

    let session_ids = {
        let mut stmt = tx.prepare("SELECT id FROM game_sessions WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for session_id in &session_ids {
        delete_session_children(&tx, session_id)?;
        tx.execute("DELETE FROM game_sessions WHERE id = ?1", params![session_id])?;
    }

    tx.execute("DELETE FROM user_stats WHERE user_id = ?1", params![user_id])?;
    tx.execute(
        "DELETE FROM user_game_stats WHERE user_id = ?1",
        params![user_id],
    )?;
    tx.execute("DELETE FROM org_members WHERE user_id = ?1", params![user_id])?;
    tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    tx.commit()?;
    Ok(())
}

fn delete_session_children(tx: &Transaction<'_>, session_id: &str) -> Result<(), DbError> {
    tx.execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])?;
    tx.execute(
        "DELETE FROM game_states WHERE session_id = ?1",
        params![session_id],
    )?;
    tx.execute(
        "DELETE FROM evaluations WHERE session_id = ?1",
        params![session_id],
    )?;
    tx.execute("DELETE FROM events WHERE session_id = ?1", params![session_id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Game session queries
// ---------------------------------------------------------------------------

const SESSION_COLUMNS: &str =
    "id, user_id, game_type, status, started_at, ended_at, duration_minutes, score, evidence_json";

fn map_session(row: &Row<'_>) -> rusqlite::Result<GameSessionRow> {
    Ok(GameSessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        game_type: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        duration_minutes: row.get(6)?,
        score: row.get(7)?,
        evidence_json: row.get(8)?,
    })
}

pub fn get_session(db: &Database, id: &str) -> Result<Option<GameSessionRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = ?1"),
            params![id],
            map_session,
        )
        .optional()?;
    Ok(row)
}

pub fn get_active_session(
    db: &Database,
    user_id: &str,
    game_type: &str,
) -> Result<Option<GameSessionRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE user_id = ?1 AND game_type = ?2 AND status = 'active'"
            ),
            params![user_id, game_type],
            map_session,
        )
        .optional()?;
    Ok(row)
}

pub fn list_sessions_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Vec<GameSessionRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE user_id = ?1 ORDER BY started_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![user_id], map_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Return the active session for `(user_id, game_type)` or create one, inside a
/// single write transaction. The boolean is true when a new row was inserted.
pub fn find_or_create_active_session(
    db: &Database,
    new_id: &str,
    user_id: &str,
    game_type: &str,
    started_at: &str,
) -> Result<(GameSessionRow, bool), DbError> {
    let conn = db.conn();
    let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

    let user_exists = tx
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| {
            Ok(())
        })
        .optional()?
        .is_some();
    if !user_exists {
        return Err(DbError::NotFound(format!("user {user_id}")));
    }

    let existing = tx
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE user_id = ?1 AND game_type = ?2 AND status = 'active'"
            ),
            params![user_id, game_type],
            map_session,
        )
        .optional()?;
    if let Some(row) = existing {
        tx.commit()?;
        return Ok((row, false));
    }

    tx.execute(
        "INSERT INTO game_sessions (id, user_id, game_type, status, started_at) VALUES (?1, ?2, ?3, 'active', ?4)",
        params![new_id, user_id, game_type, started_at],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            DbError::Conflict(format!("active {game_type} session already exists for {user_id}"))
        } else {
            DbError::Sqlite(e)
        }
    })?;
    let row = tx.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = ?1"),
        params![new_id],
        map_session,
    )?;
    tx.commit()?;
    Ok((row, true))
}

/// Mark an active session completed and fold it into the user's statistics.
/// Both writes commit together or not at all.
pub fn complete_session(
    db: &Database,
    completion: &SessionCompletion,
) -> Result<GameSessionRow, DbError> {
    let conn = db.conn();
    let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

    let session = tx
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = ?1"),
            params![completion.session_id],
            map_session,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("session {}", completion.session_id)))?;
    if session.status != "active" {
        return Err(DbError::InvalidState(format!(
            "session {} is {}",
            session.id, session.status
        )));
    }

    tx.execute(
        "UPDATE game_sessions
         SET status = 'completed', ended_at = ?2, duration_minutes = ?3, score = ?4, evidence_json = ?5
         WHERE id = ?1",
        params![
            completion.session_id,
            completion.ended_at,
            completion.duration_minutes,
            completion.score,
            completion.evidence_json,
        ],
    )?;

    tx.execute(
        "INSERT INTO user_stats (user_id, games_played, total_minutes, scored_games, total_score, best_score, average_score, last_played_at)
         VALUES (?1, 1, ?2, CASE WHEN ?3 IS NULL THEN 0 ELSE 1 END, COALESCE(?3, 0), COALESCE(?3, 0), COALESCE(?3, 0), ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            games_played = games_played + 1,
            total_minutes = total_minutes + excluded.total_minutes,
            scored_games = scored_games + excluded.scored_games,
            total_score = total_score + excluded.total_score,
            best_score = MAX(best_score, excluded.best_score),
            average_score = CASE
                WHEN scored_games + excluded.scored_games = 0 THEN 0.0
                ELSE CAST(total_score + excluded.total_score AS REAL) / (scored_games + excluded.scored_games)
            END,
            last_played_at = excluded.last_played_at",
        params![
            session.user_id,
            completion.duration_minutes,
            completion.score,
            completion.ended_at,
        ],
    )?;

    tx.execute(
        "INSERT INTO user_game_stats (user_id, game_type, games_played, scored_games, total_score, best_score)
         VALUES (?1, ?2, 1, CASE WHEN ?3 IS NULL THEN 0 ELSE 1 END, COALESCE(?3, 0), COALESCE(?3, 0))
         ON CONFLICT(user_id, game_type) DO UPDATE SET
            games_played = games_played + 1,
            scored_games = scored_games + excluded.scored_games,
            total_score = total_score + excluded.total_score,
            best_score = MAX(best_score, excluded.best_score)",
        params![session.user_id, session.game_type, completion.score],
    )?;

    let updated = tx.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = ?1"),
        params![completion.session_id],
        map_session,
    )?;
    tx.commit()?;
    Ok(updated)
}

/// Move an active session to `abandoned`. Returns false if it was not active.
pub fn abandon_session(db: &Database, id: &str, ended_at: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE game_sessions SET status = 'abandoned', ended_at = ?2 WHERE id = ?1 AND status = 'active'",
        params![id, ended_at],
    )?;
    Ok(changed > 0)
}

/// Abandon every active session started before `cutoff`; returns their ids.
pub fn abandon_sessions_started_before(
    db: &Database,
    cutoff: &str,
    ended_at: &str,
) -> Result<Vec<String>, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;
    let ids = {
        let mut stmt = tx.prepare(
            "SELECT id FROM game_sessions WHERE status = 'active' AND started_at < ?1",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    for id in &ids {
        tx.execute(
            "UPDATE game_sessions SET status = 'abandoned', ended_at = ?2 WHERE id = ?1",
            params![id, ended_at],
        )?;
    }
    tx.commit()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Stats queries
// ---------------------------------------------------------------------------

pub fn get_user_stats(db: &Database, user_id: &str) -> Result<Option<UserStatsRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT user_id, games_played, total_minutes, scored_games, total_score, best_score, average_score, last_played_at
             FROM user_stats WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserStatsRow {
                    user_id: row.get(0)?,
                    games_played: row.get(1)?,
                    total_minutes: row.get(2)?,
                    scored_games: row.get(3)?,
                    total_score: row.get(4)?,
                    best_score: row.get(5)?,
                    average_score: row.get(6)?,
                    last_played_at: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn list_user_game_stats(
    db: &Database,
    user_id: &str,
) -> Result<Vec<UserGameStatsRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT user_id, game_type, games_played, scored_games, total_score, best_score
         FROM user_game_stats WHERE user_id = ?1 ORDER BY game_type ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(UserGameStatsRow {
                user_id: row.get(0)?,
                game_type: row.get(1)?,
                games_played: row.get(2)?,
                scored_games: row.get(3)?,
                total_score: row.get(4)?,
                best_score: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Game state, transcript and evaluation queries
// ---------------------------------------------------------------------------

pub fn upsert_game_state(db: &Database, row: &GameStateRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO game_states (session_id, state_json, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(session_id)
         DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
        params![row.session_id, row.state_json, row.updated_at],
    )?;
    Ok(())
}

pub fn get_game_state(db: &Database, session_id: &str) -> Result<Option<GameStateRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT session_id, state_json, updated_at FROM game_states WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(GameStateRow {
                    session_id: row.get(0)?,
                    state_json: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn delete_game_state(db: &Database, session_id: &str) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "DELETE FROM game_states WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(())
}

/// Append a transcript turn; its index is the next free slot for the session.
pub fn append_turn(
    db: &Database,
    id: &str,
    session_id: &str,
    role: &str,
    content: &str,
    created_at: &str,
) -> Result<TurnRow, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;
    let idx: i64 = tx.query_row(
        "SELECT COALESCE(MAX(idx) + 1, 0) FROM turns WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO turns (id, session_id, idx, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, session_id, idx, role, content, created_at],
    )?;
    tx.commit()?;
    Ok(TurnRow {
        id: id.to_string(),
        session_id: session_id.to_string(),
        idx,
        role: role.to_string(),
        content: content.to_string(),
        created_at: created_at.to_string(),
    })
}

pub fn list_turns(db: &Database, session_id: &str) -> Result<Vec<TurnRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, session_id, idx, role, content, created_at FROM turns WHERE session_id = ?1 ORDER BY idx ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            Ok(TurnRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                idx: row.get(2)?,
                role: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_evaluation(db: &Database, row: &EvaluationRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO evaluations (session_id, overall, rating, summary, breakdown_json, raw_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(session_id) DO UPDATE SET
            overall = excluded.overall,
            rating = excluded.rating,
            summary = excluded.summary,
            breakdown_json = excluded.breakdown_json,
            raw_text = excluded.raw_text,
            created_at = excluded.created_at",
        params![
            row.session_id,
            row.overall,
            row.rating,
            row.summary,
            row.breakdown_json,
            row.raw_text,
            row.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_evaluation(db: &Database, session_id: &str) -> Result<Option<EvaluationRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT session_id, overall, rating, summary, breakdown_json, raw_text, created_at
             FROM evaluations WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(EvaluationRow {
                    session_id: row.get(0)?,
                    overall: row.get(1)?,
                    rating: row.get(2)?,
                    summary: row.get(3)?,
                    breakdown_json: row.get(4)?,
                    raw_text: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub fn upsert_setting(
    db: &Database,
    key: &str,
    value_json: &str,
    updated_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO settings (key, value_json, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key)
         DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
        params![key, value_json, updated_at],
    )?;
    Ok(())
}

pub fn get_setting(db: &Database, key: &str) -> Result<Option<String>, DbError> {
    let conn = db.conn();
    let value = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Event queries
// ---------------------------------------------------------------------------

pub fn insert_event(db: &Database, row: &EventRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO events (id, session_id, seq, category, event_type, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.id,
            row.session_id,
            row.seq,
            row.category,
            row.event_type,
            row.payload_json,
            row.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_session_events_after(
    db: &Database,
    session_id: &str,
    after_seq: i64,
) -> Result<Vec<EventRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, session_id, seq, category, event_type, payload_json, created_at
         FROM events WHERE session_id = ?1 AND seq > ?2 ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id, after_seq], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                seq: row.get(2)?,
                category: row.get(3)?,
                event_type: row.get(4)?,
                payload_json: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Highest persisted event sequence number, so the bus can resume numbering.
pub fn max_event_seq(db: &Database) -> Result<i64, DbError> {
    let conn = db.conn();
    let seq = conn.query_row("SELECT COALESCE(MAX(seq), -1) FROM events", [], |row| {
        row.get(0)
    })?;
    Ok(seq)
}

// ---------------------------------------------------------------------------
// Organization queries
// ---------------------------------------------------------------------------

fn map_organization(row: &Row<'_>) -> rusqlite::Result<OrganizationRow> {
    Ok(OrganizationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn insert_organization(db: &Database, row: &OrganizationRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO organizations (id, name, created_by, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.name, row.created_by, row.created_at, row.updated_at],
    )?;
    Ok(())
}

pub fn get_organization(db: &Database, id: &str) -> Result<Option<OrganizationRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT id, name, created_by, created_at, updated_at FROM organizations WHERE id = ?1",
            params![id],
            map_organization,
        )
        .optional()?;
    Ok(row)
}

pub fn list_organizations(db: &Database) -> Result<Vec<OrganizationRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, name, created_by, created_at, updated_at FROM organizations ORDER BY name COLLATE NOCASE ASC",
    )?;
    let rows = stmt
        .query_map([], map_organization)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_organizations_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Vec<OrganizationRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT o.id, o.name, o.created_by, o.created_at, o.updated_at
         FROM organizations o
         INNER JOIN org_members m ON m.org_id = o.id
         WHERE m.user_id = ?1
         ORDER BY o.name COLLATE NOCASE ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], map_organization)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn rename_organization(
    db: &Database,
    id: &str,
    name: &str,
    updated_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE organizations SET name = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, name, updated_at],
    )?;
    Ok(changed > 0)
}

pub fn delete_organization_cascade(db: &Database, org_id: &str) -> Result<(), DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM assignments WHERE org_id = ?1", params![org_id])?;
    tx.execute("DELETE FROM org_members WHERE org_id = ?1", params![org_id])?;
    tx.execute("DELETE FROM organizations WHERE id = ?1", params![org_id])?;
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Membership queries
// ---------------------------------------------------------------------------

/// Idempotent: adding an existing member is a no-op.
pub fn add_member(
    db: &Database,
    org_id: &str,
    user_id: &str,
    created_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT OR IGNORE INTO org_members (org_id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![org_id, user_id, created_at],
    )?;
    Ok(())
}

pub fn remove_member(db: &Database, org_id: &str, user_id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "DELETE FROM org_members WHERE org_id = ?1 AND user_id = ?2",
        params![org_id, user_id],
    )?;
    Ok(changed > 0)
}

pub fn is_member(db: &Database, org_id: &str, user_id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let found = conn
        .query_row(
            "SELECT 1 FROM org_members WHERE org_id = ?1 AND user_id = ?2",
            params![org_id, user_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_members(db: &Database, org_id: &str) -> Result<Vec<OrgMemberRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT m.org_id, u.id, u.email, u.display_name, u.role, m.created_at
         FROM org_members m
         INNER JOIN users u ON u.id = m.user_id
         WHERE m.org_id = ?1
         ORDER BY u.display_name COLLATE NOCASE ASC",
    )?;
    let rows = stmt
        .query_map(params![org_id], |row| {
            Ok(OrgMemberRow {
                org_id: row.get(0)?,
                user_id: row.get(1)?,
                email: row.get(2)?,
                display_name: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Assignment queries
// ---------------------------------------------------------------------------

pub fn insert_assignment(db: &Database, row: &AssignmentRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO assignments (id, org_id, game_type, due_at, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.org_id,
            row.game_type,
            row.due_at,
            row.created_by,
            row.created_at
        ],
    )?;
    Ok(())
}

pub fn get_assignment(db: &Database, id: &str) -> Result<Option<AssignmentRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT id, org_id, game_type, due_at, created_by, created_at FROM assignments WHERE id = ?1",
            params![id],
            map_assignment,
        )
        .optional()?;
    Ok(row)
}

fn map_assignment(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
    Ok(AssignmentRow {
        id: row.get(0)?,
        org_id: row.get(1)?,
        game_type: row.get(2)?,
        due_at: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn list_assignments(db: &Database, org_id: &str) -> Result<Vec<AssignmentRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, org_id, game_type, due_at, created_by, created_at
         FROM assignments WHERE org_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![org_id], map_assignment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_assignment(db: &Database, id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute("DELETE FROM assignments WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Dashboard aggregates
// ---------------------------------------------------------------------------

pub fn count_rows(db: &Database, table: DashboardTable) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.as_str()),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Tables that the platform overview counts.
#[derive(Debug, Clone, Copy)]
pub enum DashboardTable {
    Users,
    Organizations,
}

impl DashboardTable {
    const fn as_str(self) -> &'static str {
        match self {
            DashboardTable::Users => "users",
            DashboardTable::Organizations => "organizations",
        }
    }
}

pub fn count_sessions_by_status(db: &Database) -> Result<Vec<(String, i64)>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM game_sessions GROUP BY status ORDER BY status ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn average_completed_score(db: &Database) -> Result<Option<f64>, DbError> {
    let conn = db.conn();
    let avg = conn.query_row(
        "SELECT AVG(score) FROM game_sessions WHERE status = 'completed' AND score IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(avg)
}

pub fn count_org_members(db: &Database, org_id: &str) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM org_members WHERE org_id = ?1",
        params![org_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Average score of scored, completed sessions played by the organization's members.
pub fn org_average_score(db: &Database, org_id: &str) -> Result<Option<f64>, DbError> {
    let conn = db.conn();
    let avg = conn.query_row(
        "SELECT AVG(s.score)
         FROM game_sessions s
         INNER JOIN org_members m ON m.user_id = s.user_id
         WHERE m.org_id = ?1 AND s.status = 'completed' AND s.score IS NOT NULL",
        params![org_id],
        |row| row.get(0),
    )?;
    Ok(avg)
}

/// Completed-session counts and average scores per game type, across an
/// organization's members.
pub fn org_breakdown_by_game_type(
    db: &Database,
    org_id: &str,
) -> Result<Vec<GameTypeBreakdownRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT s.game_type, COUNT(*), AVG(s.score)
         FROM game_sessions s
         INNER JOIN org_members m ON m.user_id = s.user_id
         WHERE m.org_id = ?1 AND s.status = 'completed'
         GROUP BY s.game_type
         ORDER BY s.game_type ASC",
    )?;
    let rows = stmt
        .query_map(params![org_id], |row| {
            Ok(GameTypeBreakdownRow {
                game_type: row.get(0)?,
                completed: row.get(1)?,
                average_score: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct game types the user has completed at least once.
pub fn list_completed_game_types(db: &Database, user_id: &str) -> Result<Vec<String>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT DISTINCT game_type FROM game_sessions
         WHERE user_id = ?1 AND status = 'completed'
         ORDER BY game_type ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_leaderboard(row: &Row<'_>) -> rusqlite::Result<LeaderboardRow> {
    Ok(LeaderboardRow {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        games_played: row.get(2)?,
        best_score: row.get(3)?,
        average_score: row.get(4)?,
    })
}

pub fn leaderboard(
    db: &Database,
    game_type: Option<&str>,
    limit: i64,
) -> Result<Vec<LeaderboardRow>, DbError> {
    let conn = db.conn();
    let rows = match game_type {
        Some(game_type) => {
            let mut stmt = conn.prepare(
                "SELECT g.user_id, u.display_name, g.games_played, g.best_score,
                        CASE WHEN g.scored_games = 0 THEN 0.0
                             ELSE CAST(g.total_score AS REAL) / g.scored_games END AS avg_score
                 FROM user_game_stats g
                 INNER JOIN users u ON u.id = g.user_id
                 WHERE g.game_type = ?1 AND g.scored_games > 0
                 ORDER BY g.best_score DESC, avg_score DESC, u.display_name ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![game_type, limit], map_leaderboard)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT s.user_id, u.display_name, s.games_played, s.best_score, s.average_score
                 FROM user_stats s
                 INNER JOIN users u ON u.id = s.user_id
                 WHERE s.scored_games > 0
                 ORDER BY s.best_score DESC, s.average_score DESC, u.display_name ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], map_leaderboard)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
