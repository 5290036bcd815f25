use chrono::Utc;

use crate::db::queries;
use crate::model::catalog::{ModelInfo, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::model::ModelCatalog;
use crate::runtime::generation_settings::{
    effective_generation_settings, save_generation_settings, GenerationSettings,
};
use crate::{
    load_provider_config, provider_setting_key, AppError, AppState, ProviderConfig,
    ProviderConfigView, OPENAI_PROVIDER,
};

/// Admin only.
#[tauri::command]
pub fn set_provider_config(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    api_key: String,
    default_model: Option<String>,
    base_url: Option<String>,
) -> Result<(), AppError> {
    state.admin.require_admin(&actor_id)?;
    if api_key.trim().is_empty() {
        return Err(AppError::Other("api key cannot be empty".to_string()));
    }
    if let Some(url) = base_url.as_deref() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Other(format!("base url must be http(s): {url}")));
        }
    }

    let value = serde_json::to_string(&ProviderConfig {
        api_key: api_key.trim().to_string(),
        default_model,
        base_url,
    })
    .map_err(|e| AppError::Other(e.to_string()))?;

    queries::upsert_setting(
        &state.db,
        &provider_setting_key(OPENAI_PROVIDER),
        &value,
        &Utc::now().to_rfc3339(),
    )?;
    Ok(())
}

/// The api key itself never leaves the backend.
#[tauri::command]
pub fn get_provider_config(
    state: tauri::State<'_, AppState>,
) -> Result<ProviderConfigView, AppError> {
    let cfg = load_provider_config(&state.db)?;
    let from_env = cfg.as_ref().is_some_and(|(_, env)| *env);
    let cfg = cfg.map(|(cfg, _)| cfg);
    Ok(ProviderConfigView {
        provider: OPENAI_PROVIDER.to_string(),
        configured: cfg.is_some(),
        from_env,
        default_model: cfg
            .as_ref()
            .and_then(|c| c.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        base_url: cfg
            .and_then(|c| c.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    })
}

#[tauri::command]
pub fn get_model_catalog() -> Vec<ModelInfo> {
    ModelCatalog::all_models()
}

#[tauri::command]
pub fn get_generation_settings(state: tauri::State<'_, AppState>) -> GenerationSettings {
    effective_generation_settings(&state.db)
}

/// Admin only. Out-of-range values are clamped before saving; the stored
/// values are returned.
#[tauri::command]
pub fn set_generation_settings(
    state: tauri::State<'_, AppState>,
    actor_id: String,
    settings: GenerationSettings,
) -> Result<GenerationSettings, AppError> {
    state.admin.require_admin(&actor_id)?;
    let settings = settings.sanitized();
    save_generation_settings(&state.db, &settings).map_err(AppError::Other)?;
    Ok(settings)
}
