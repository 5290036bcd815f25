//! Generation settings for the three kinds of model calls a simulation makes.

use crate::db::{queries, Database};

const SETTINGS_KEY: &str = "generation_settings";

/// Default token cap when generating a case file (JSON, fairly large).
pub const DEFAULT_CASE_MAX_TOKENS: u32 = 2_000;
pub const DEFAULT_NARRATION_MAX_TOKENS: u32 = 600;
pub const DEFAULT_EVALUATION_MAX_TOKENS: u32 = 900;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub case_generation: CallSettings,
    pub narration: CallSettings,
    /// Kept cool so the `<parameter>: N/10` lines come back reliably.
    pub evaluation: CallSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            case_generation: CallSettings {
                temperature: 0.9,
                max_tokens: DEFAULT_CASE_MAX_TOKENS,
            },
            narration: CallSettings {
                temperature: 0.8,
                max_tokens: DEFAULT_NARRATION_MAX_TOKENS,
            },
            evaluation: CallSettings {
                temperature: 0.2,
                max_tokens: DEFAULT_EVALUATION_MAX_TOKENS,
            },
        }
    }
}

impl GenerationSettings {
    /// Clamp user-supplied values into ranges the API accepts.
    pub fn sanitized(mut self) -> Self {
        for call in [
            &mut self.case_generation,
            &mut self.narration,
            &mut self.evaluation,
        ] {
            if !call.temperature.is_finite() {
                call.temperature = 0.7;
            }
            call.temperature = call.temperature.clamp(0.0, 2.0);
            call.max_tokens = call.max_tokens.clamp(64, 16_000);
        }
        self
    }
}

/// Load generation settings from the database (or return defaults).
pub fn load_generation_settings(db: &Database) -> Result<GenerationSettings, String> {
    match queries::get_setting(db, SETTINGS_KEY) {
        Ok(Some(json_str)) => serde_json::from_str::<GenerationSettings>(&json_str)
            .map(GenerationSettings::sanitized)
            .map_err(|e| format!("Failed to parse generation settings: {e}")),
        Ok(None) => Ok(GenerationSettings::default()),
        Err(e) => Err(format!("Failed to load generation settings: {e}")),
    }
}

pub fn save_generation_settings(db: &Database, settings: &GenerationSettings) -> Result<(), String> {
    let json_str = serde_json::to_string(&settings.clone().sanitized())
        .map_err(|e| format!("Failed to serialize generation settings: {e}"))?;

    let now = chrono::Utc::now().to_rfc3339();
    queries::upsert_setting(db, SETTINGS_KEY, &json_str, &now)
        .map_err(|e| format!("Failed to save generation settings: {e}"))?;

    Ok(())
}

/// Settings to use for a call, falling back to defaults if the stored value is unreadable.
pub fn effective_generation_settings(db: &Database) -> GenerationSettings {
    load_generation_settings(db).unwrap_or_else(|e| {
        tracing::warn!("{e}; using default generation settings");
        GenerationSettings::default()
    })
}
