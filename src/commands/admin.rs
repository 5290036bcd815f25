use crate::admin::{NewUser, OrganizationDashboard, PlatformOverview, UserUpdate};
use crate::core::catalog::SimulationKind;
use crate::db::queries::{AssignmentRow, LeaderboardRow, OrgMemberRow, OrganizationRow, UserRow};
use crate::{AppError, AppState};

const DEFAULT_LEADERBOARD_LIMIT: i64 = 20;

fn parse_kind(raw: &str) -> Result<SimulationKind, AppError> {
    raw.parse().map_err(AppError::Other)
}

// -- users -------------------------------------------------------------------

/// `actor_id` is absent for self-registration.
#[tauri::command]
pub fn create_user(
    state: tauri::State<'_, AppState>,
    actor_id: Option<String>,
    user: NewUser,
) -> Result<UserRow, AppError> {
    Ok(state.admin.create_user(actor_id.as_deref(), user)?)
}

#[tauri::command]
pub fn get_user(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    user_id: String,
) -> Result<UserRow, AppError> {
    Ok(state.admin.get_user(&actor_id, &user_id)?)
}

#[tauri::command]
pub fn list_users(
    state: tauri::State<'_, AppState>,
    actor_id: String,
) -> Result<Vec<UserRow>, AppError> {
    Ok(state.admin.list_users(&actor_id)?)
}

#[tauri::command]
pub fn update_user(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    user_id: String,
    update: UserUpdate,
) -> Result<UserRow, AppError> {
    Ok(state.admin.update_user(&actor_id, &user_id, update)?)
}

#[tauri::command]
pub fn delete_user(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    user_id: String,
) -> Result<(), AppError> {
    Ok(state.admin.delete_user(&actor_id, &user_id)?)
}

// -- organizations -----------------------------------------------------------

#[tauri::command]
pub fn create_organization(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    name: String,
) -> Result<OrganizationRow, AppError> {
    Ok(state.admin.create_organization(&actor_id, &name)?)
}

#[tauri::command]
pub fn get_organization(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
) -> Result<OrganizationRow, AppError> {
    Ok(state.admin.get_organization(&actor_id, &org_id)?)
}

#[tauri::command]
pub fn list_organizations(
    state: tauri::State<'_, AppState>,
    actor_id: String,
) -> Result<Vec<OrganizationRow>, AppError> {
    Ok(state.admin.list_organizations(&actor_id)?)
}

#[tauri::command]
pub fn rename_organization(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
    name: String,
) -> Result<OrganizationRow, AppError> {
    Ok(state.admin.rename_organization(&actor_id, &org_id, &name)?)
}

#[tauri::command]
pub fn delete_organization(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
) -> Result<(), AppError> {
    Ok(state.admin.delete_organization(&actor_id, &org_id)?)
}

// -- memberships -------------------------------------------------------------

#[tauri::command]
pub fn add_member(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
    user_id: String,
) -> Result<(), AppError> {
    Ok(state.admin.add_member(&actor_id, &org_id, &user_id)?)
}

#[tauri::command]
pub fn remove_member(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
    user_id: String,
) -> Result<bool, AppError> {
    Ok(state.admin.remove_member(&actor_id, &org_id, &user_id)?)
}

#[tauri::command]
pub fn list_members(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
) -> Result<Vec<OrgMemberRow>, AppError> {
    Ok(state.admin.list_members(&actor_id, &org_id)?)
}

// -- assignments -------------------------------------------------------------

#[tauri::command]
pub fn create_assignment(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
    game_type: String,
    due_at: Option<String>,
) -> Result<AssignmentRow, AppError> {
    let kind = parse_kind(&game_type)?;
    Ok(state.admin.create_assignment(&actor_id, &org_id, kind, due_at)?)
}

#[tauri::command]
pub fn list_assignments(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
) -> Result<Vec<AssignmentRow>, AppError> {
    Ok(state.admin.list_assignments(&actor_id, &org_id)?)
}

#[tauri::command]
pub fn remove_assignment(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    assignment_id: String,
) -> Result<(), AppError> {
    Ok(state.admin.remove_assignment(&actor_id, &assignment_id)?)
}

// -- dashboards --------------------------------------------------------------

#[tauri::command]
pub fn get_organization_dashboard(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    org_id: String,
) -> Result<OrganizationDashboard, AppError> {
    Ok(state.admin.organization_dashboard(&actor_id, &org_id)?)
}

#[tauri::command]
pub fn get_platform_overview(
    state: tauri::State<'_, AppState>,
    actor_id: String,
) -> Result<PlatformOverview, AppError> {
    Ok(state.admin.platform_overview(&actor_id)?)
}

#[tauri::command]
pub fn get_leaderboard(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    game_type: Option<String>,
    limit: Option<i64>,
) -> Result<Vec<LeaderboardRow>, AppError> {
    let kind = game_type.as_deref().map(parse_kind).transpose()?;
    Ok(state.admin.leaderboard(
        &actor_id,
        kind,
        limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT),
    )?)
}
