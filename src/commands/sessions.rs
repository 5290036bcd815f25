use crate::core::catalog::SimulationKind;
use crate::db::queries::GameSessionRow;
use crate::runtime::sessions::UserStats;
use crate::{AppError, AppState};

#[tauri::command]
pub fn list_sessions(
    state: tauri::State<'_, AppState>,
    user_id: String,
) -> Result<Vec<GameSessionRow>, AppError> {
    Ok(state.sessions.list_sessions(&user_id)?)
}

#[tauri::command]
pub fn get_active_session(
    state: tauri::State<'_, AppState>,
    user_id: String,
    game_type: String,
) -> Result<Option<GameSessionRow>, AppError> {
    let kind: SimulationKind = game_type.parse().map_err(AppError::Other)?;
    Ok(state.sessions.active_session(&user_id, kind.tag())?)
}

#[tauri::command]
pub fn get_user_stats(
    state: tauri::State<'_, AppState>,
    user_id: String,
) -> Result<UserStats, AppError> {
    Ok(state.sessions.user_stats(&user_id)?)
}
