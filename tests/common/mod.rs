// tests/common/mod.rs
//! Shared setup for integration tests: services over an on-disk database and
//! a mock Chat Completions endpoint.

use std::path::Path;
use std::sync::Arc;

use casefile_lib::admin::AdminService;
use casefile_lib::bus::EventBus;
use casefile_lib::db::Database;
use casefile_lib::model::OpenAiClient;
use casefile_lib::runtime::engine::SimulationEngine;
use casefile_lib::runtime::sessions::GameSessionManager;
use casefile_lib::runtime::state::GameStateStore;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;

pub const CASE_JSON: &str = r#"{
  "title": "The Quayside Ledger",
  "setting": "A shipping office on a foggy dock",
  "victim": "Harbourmaster Reyes",
  "opening": "The office smells of salt and burnt paper. Reyes lies by the safe.",
  "suspects": [
    { "name": "Ines Duarte", "description": "Bookkeeper", "alibi": "At the bank", "motive": "Embezzlement" },
    { "name": "Tom Whitlock", "description": "Dock foreman", "alibi": "On the pier", "motive": "Grudge" },
    { "name": "Mara Lind", "description": "Customs agent", "alibi": "At lunch", "motive": "Bribes" }
  ],
  "clues": [
    { "id": "ledger", "description": "A ledger with torn pages", "location": "desk", "implicates": "Ines Duarte" },
    { "id": "ash", "description": "Ash from burnt receipts", "location": "stove" }
  ],
  "culprit": "Ines Duarte"
}"#;

pub const EVALUATION: &str = "You tied the ledger to the bookkeeper quickly.\n\
    Critical Thinking: 7/10\n\
    Evidence Analysis: 8/10\n\
    Intuition: 6/10";

pub struct TestApp {
    pub db: Arc<Database>,
    pub bus: Arc<EventBus>,
    pub sessions: Arc<GameSessionManager>,
    pub states: Arc<GameStateStore>,
    pub engine: SimulationEngine,
    pub admin: AdminService,
}

impl TestApp {
    pub fn open(path: &Path) -> Self {
        let db = Arc::new(Database::open(path).expect("open database"));
        let bus = Arc::new(EventBus::new());
        let sessions = Arc::new(GameSessionManager::new(db.clone()));
        let states = Arc::new(GameStateStore::new(db.clone()));
        let engine = SimulationEngine::new(db.clone(), bus.clone(), sessions.clone(), states.clone());
        let admin = AdminService::new(db.clone(), states.clone());
        Self {
            db,
            bus,
            sessions,
            states,
            engine,
            admin,
        }
    }
}

/// Route requests by shape: JSON mode is case generation, streamed requests
/// are narration, and the rest are evaluations.
pub async fn mock_openai(server: &MockServer, narration_sse: &str) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("json_object");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": CASE_JSON },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 300, "completion_tokens": 250 }
            }));
        })
        .await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"stream\":true");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(narration_sse);
        })
        .await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("You assess");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": EVALUATION },
                    "finish_reason": "stop"
                }]
            }));
        })
        .await;
}

/// SSE body that streams `parts` as separate deltas.
pub fn sse(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        let chunk = json!({ "choices": [{ "delta": { "content": part } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn client_for(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(
        "test-key".to_string(),
        Some("gpt-4o-mini".to_string()),
        Some(format!("{}/v1", server.base_url())),
    )
    .expect("client should build")
}
