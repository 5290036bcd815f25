//! Casefile backend library.
//!
//! Hosts AI-narrated training simulations (murder mysteries, workplace
//! drills) behind a Tauri shell:
//! - `commands`: Tauri command handlers (IPC entry points)
//! - `runtime`: session lifecycle, per-session game state, simulation engine
//! - `core`: catalog, case files and the score calculator
//! - `admin`: users, organizations, assignments and dashboards
//! - `db`: SQLite storage and migrations
//! - `bus`: event bus for real-time updates
//! - `model`: OpenAI-compatible chat client

pub mod admin;
pub mod bus;
mod commands;
pub mod core;
pub mod db;
pub mod model;
pub mod runtime;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use admin::{AdminError, AdminService};
use bus::{EventBatcher, EventBus};
use db::queries;
use db::Database;
use model::{ModelError, OpenAiClient};
use runtime::engine::{EngineError, SimulationEngine};
use runtime::sessions::{GameSessionManager, SessionError};
use runtime::state::{GameStateStore, StateError};

pub const OPENAI_PROVIDER: &str = "openai";

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    Db(#[from] db::DbError),
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Admin(#[from] AdminError),
    #[error("{0}")]
    Model(#[from] ModelError),
    #[error("{0}")]
    Other(String),
}

impl Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProviderConfigView {
    pub provider: String,
    pub configured: bool,
    pub from_env: bool,
    pub default_model: String,
    pub base_url: String,
}

pub(crate) struct AppState {
    pub db: Arc<Database>,
    pub sessions: Arc<GameSessionManager>,
    pub states: Arc<GameStateStore>,
    pub engine: Arc<SimulationEngine>,
    pub admin: Arc<AdminService>,
}

// ---------------------------------------------------------------------------
// Shared helper functions
// ---------------------------------------------------------------------------

pub fn provider_setting_key(provider: &str) -> String {
    format!("provider_config:{provider}")
}

fn env_provider_config() -> Option<ProviderConfig> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    if api_key.trim().is_empty() {
        return None;
    }
    Some(ProviderConfig {
        api_key,
        default_model: std::env::var("OPENAI_MODEL").ok(),
        base_url: std::env::var("OPENAI_BASE_URL").ok(),
    })
}

/// Environment variables win over the stored config. The boolean is true
/// when the config came from the environment.
pub(crate) fn load_provider_config(
    db: &Database,
) -> Result<Option<(ProviderConfig, bool)>, AppError> {
    if let Some(cfg) = env_provider_config() {
        return Ok(Some((cfg, true)));
    }

    let Some(raw) = queries::get_setting(db, &provider_setting_key(OPENAI_PROVIDER))? else {
        return Ok(None);
    };
    let cfg: ProviderConfig = serde_json::from_str(&raw)
        .map_err(|e| AppError::Other(format!("invalid {OPENAI_PROVIDER} provider config: {e}")))?;
    Ok(Some((cfg, false)))
}

/// Build a chat client from the current provider config.
pub(crate) fn model_client(db: &Database) -> Result<OpenAiClient, AppError> {
    let (cfg, _) = load_provider_config(db)?.ok_or_else(|| {
        AppError::Other(
            "OpenAI is not configured: set OPENAI_API_KEY or save a provider config".to_string(),
        )
    })?;
    Ok(OpenAiClient::new(cfg.api_key, cfg.default_model, cfg.base_url)?)
}

fn casefile_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("CASEFILE_DATA_DIR") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("Casefile");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".casefile");
    }

    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".casefile");
    }

    PathBuf::from(".casefile")
}

fn stable_db_path() -> Result<PathBuf, String> {
    let data_dir = casefile_data_dir();
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| format!("failed to create app data directory {}: {e}", data_dir.display()))?;
    Ok(data_dir.join("casefile.db"))
}

// ---------------------------------------------------------------------------
// Application entry point
// ---------------------------------------------------------------------------

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casefile=debug,info".parse().expect("valid env filter")),
        )
        .init();

    let db_path = stable_db_path().expect("failed to resolve stable database path");
    let db = Arc::new(Database::open(&db_path).expect("failed to open database"));
    let next_seq = queries::max_event_seq(&db).unwrap_or_else(|e| {
        tracing::warn!("failed to read event sequence, starting at 0: {e}");
        -1
    }) + 1;
    let bus = Arc::new(EventBus::starting_at(next_seq));
    let sessions = Arc::new(GameSessionManager::new(db.clone()));
    let states = Arc::new(GameStateStore::new(db.clone()));
    let engine = Arc::new(SimulationEngine::new(
        db.clone(),
        bus.clone(),
        sessions.clone(),
        states.clone(),
    ));
    let admin = Arc::new(AdminService::new(db.clone(), states.clone()));

    let state = AppState {
        db: db.clone(),
        sessions: sessions.clone(),
        states: states.clone(),
        engine,
        admin,
    };

    tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            // simulations
            commands::simulations::list_simulations,
            commands::simulations::begin_simulation,
            commands::simulations::play_turn,
            commands::simulations::finish_simulation,
            commands::simulations::abandon_simulation,
            commands::simulations::get_transcript,
            commands::simulations::get_game_state,
            commands::simulations::get_evaluation,
            commands::simulations::get_session_events_after,
            // sessions
            commands::sessions::list_sessions,
            commands::sessions::get_active_session,
            commands::sessions::get_user_stats,
            // admin
            commands::admin::create_user,
            commands::admin::get_user,
            commands::admin::list_users,
            commands::admin::update_user,
            commands::admin::delete_user,
            commands::admin::create_organization,
            commands::admin::get_organization,
            commands::admin::list_organizations,
            commands::admin::rename_organization,
            commands::admin::delete_organization,
            commands::admin::add_member,
            commands::admin::remove_member,
            commands::admin::list_members,
            commands::admin::create_assignment,
            commands::admin::list_assignments,
            commands::admin::remove_assignment,
            commands::admin::get_organization_dashboard,
            commands::admin::get_platform_overview,
            commands::admin::get_leaderboard,
            // providers
            commands::providers::set_provider_config,
            commands::providers::get_provider_config,
            commands::providers::get_model_catalog,
            commands::providers::get_generation_settings,
            commands::providers::set_generation_settings,
        ])
        .setup(move |app| {
            let rx = bus.subscribe();
            let handle = app.handle().clone();
            EventBatcher::start(rx, handle);

            let (db, bus, sessions, states) =
                (db.clone(), bus.clone(), sessions.clone(), states.clone());
            tauri::async_runtime::spawn(async move {
                runtime::recovery::recover(&db, &bus, &sessions, &states);
            });

            tracing::info!("Casefile started");
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
