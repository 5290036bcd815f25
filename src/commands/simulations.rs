use crate::core::catalog::{catalog_entries, CatalogEntry, Difficulty, SimulationKind};
use crate::db::queries::{self, GameSessionRow};
use crate::runtime::engine::{SimulationResult, SimulationStart, TurnOutcome};
use crate::runtime::state::PublicGameState;
use crate::{model_client, AppError, AppState};

/// Sessions are only reachable by the user who started them.
fn owned_session(
    state: &AppState,
    user_id: &str,
    session_id: &str,
) -> Result<GameSessionRow, AppError> {
    let session = state.sessions.get_session(session_id)?;
    if session.user_id != user_id {
        return Err(AppError::Other(format!(
            "session {session_id} belongs to another user"
        )));
    }
    Ok(session)
}

#[tauri::command]
pub fn list_simulations() -> Vec<CatalogEntry> {
    catalog_entries()
}

#[tauri::command]
pub async fn begin_simulation(
    state: tauri::State<'_, AppState>,
    user_id: String,
    game_type: String,
    difficulty: Option<String>,
) -> Result<SimulationStart, AppError> {
    let kind: SimulationKind = game_type.parse().map_err(AppError::Other)?;
    let difficulty = match difficulty {
        Some(raw) => raw.parse::<Difficulty>().map_err(AppError::Other)?,
        None => Difficulty::default(),
    };
    if queries::get_user(&state.db, &user_id)?.is_none() {
        return Err(AppError::Other(format!("user not found: {user_id}")));
    }

    let client = model_client(&state.db)?;
    Ok(state.engine.begin(&client, &user_id, kind, difficulty).await?)
}

#[tauri::command]
pub async fn play_turn(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
    input: String,
) -> Result<TurnOutcome, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    let client = model_client(&state.db)?;
    Ok(state.engine.play_turn(&client, &session_id, &input).await?)
}

#[tauri::command]
pub async fn finish_simulation(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
) -> Result<SimulationResult, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    let client = model_client(&state.db)?;
    Ok(state.engine.finish(&client, &session_id).await?)
}

#[tauri::command]
pub fn abandon_simulation(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
) -> Result<bool, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    Ok(state.engine.abandon(&session_id)?)
}

#[tauri::command]
pub fn get_transcript(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
) -> Result<Vec<queries::TurnRow>, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    Ok(state.engine.transcript(&session_id)?)
}

#[tauri::command]
pub fn get_game_state(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
) -> Result<PublicGameState, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    Ok(state.states.public_view(&session_id)?)
}

#[tauri::command]
pub fn get_evaluation(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
) -> Result<Option<queries::EvaluationRow>, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    Ok(queries::get_evaluation(&state.db, &session_id)?)
}

/// Replay recorded events so a reloaded UI can catch up.
#[tauri::command]
pub fn get_session_events_after(
    state: tauri::State<'_, AppState>,
    user_id: String,
    session_id: String,
    after_seq: i64,
) -> Result<Vec<queries::EventRow>, AppError> {
    owned_session(&state, &user_id, &session_id)?;
    Ok(queries::list_session_events_after(&state.db, &session_id, after_seq)?)
}
