use rusqlite::Connection;

use super::DbError;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'player',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE game_sessions (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL REFERENCES users(id),
    game_type         TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'active',
    started_at        TEXT NOT NULL,
    ended_at          TEXT,
    duration_minutes  INTEGER,
    score             INTEGER,
    evidence_json     TEXT
);

CREATE TABLE user_stats (
    user_id         TEXT PRIMARY KEY REFERENCES users(id),
    games_played    INTEGER NOT NULL DEFAULT 0,
    total_minutes   INTEGER NOT NULL DEFAULT 0,
    scored_games    INTEGER NOT NULL DEFAULT 0,
    total_score     INTEGER NOT NULL DEFAULT 0,
    best_score      INTEGER NOT NULL DEFAULT 0,
    average_score   REAL NOT NULL DEFAULT 0,
    last_played_at  TEXT
);

CREATE TABLE user_game_stats (
    user_id       TEXT NOT NULL REFERENCES users(id),
    game_type     TEXT NOT NULL,
    games_played  INTEGER NOT NULL DEFAULT 0,
    scored_games  INTEGER NOT NULL DEFAULT 0,
    total_score   INTEGER NOT NULL DEFAULT 0,
    best_score    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, game_type)
);

CREATE TABLE events (
    id           TEXT PRIMARY KEY,
    session_id   TEXT,
    seq          INTEGER NOT NULL,
    category     TEXT NOT NULL,
    event_type   TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE settings (
    key         TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE UNIQUE INDEX idx_sessions_one_active
    ON game_sessions(user_id, game_type) WHERE status = 'active';
CREATE INDEX idx_sessions_user_started ON game_sessions(user_id, started_at);
CREATE INDEX idx_sessions_type_status ON game_sessions(game_type, status);
CREATE INDEX idx_events_session_seq ON events(session_id, seq);
"#,
    },
    Migration {
        version: 3,
        sql: r#"
CREATE TABLE game_states (
    session_id  TEXT PRIMARY KEY REFERENCES game_sessions(id),
    state_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE turns (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES game_sessions(id),
    idx         INTEGER NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE evaluations (
    session_id      TEXT PRIMARY KEY REFERENCES game_sessions(id),
    overall         INTEGER NOT NULL,
    rating          TEXT NOT NULL,
    summary         TEXT NOT NULL,
    breakdown_json  TEXT NOT NULL,
    raw_text        TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX idx_turns_session_idx ON turns(session_id, idx);
"#,
    },
    Migration {
        version: 4,
        sql: r#"
CREATE TABLE organizations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_by  TEXT NOT NULL REFERENCES users(id),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE org_members (
    org_id      TEXT NOT NULL REFERENCES organizations(id),
    user_id     TEXT NOT NULL REFERENCES users(id),
    created_at  TEXT NOT NULL,
    PRIMARY KEY (org_id, user_id)
);

CREATE TABLE assignments (
    id          TEXT PRIMARY KEY,
    org_id      TEXT NOT NULL REFERENCES organizations(id),
    game_type   TEXT NOT NULL,
    due_at      TEXT,
    created_by  TEXT NOT NULL REFERENCES users(id),
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_org_members_user ON org_members(user_id);
CREATE INDEX idx_assignments_org ON assignments(org_id, created_at);
"#,
    },
];

pub(super) fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let applied: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
        let result = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        result
    };

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(version = migration.version, "applying schema migration");

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration(format!("v{}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}
