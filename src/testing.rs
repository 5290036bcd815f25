//! Shared fixtures for unit tests: seeded rows and a scripted model.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;

use crate::db::{queries, Database};
use crate::model::{ChatReply, ChatRequest, ModelError, SimulationModel};

pub fn seed_user(db: &Database, id: &str, role: &str) -> queries::UserRow {
    let now = Utc::now().to_rfc3339();
    let row = queries::UserRow {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        display_name: format!("User {id}"),
        role: role.to_string(),
        created_at: now.clone(),
        updated_at: now,
    };
    queries::insert_user(db, &row).expect("seed user");
    row
}

/// Insert an active session with a fixed id for `user_id`.
pub fn seed_session(db: &Database, id: &str, user_id: &str, game_type: &str) {
    let (_, created) = queries::find_or_create_active_session(
        db,
        id,
        user_id,
        game_type,
        &Utc::now().to_rfc3339(),
    )
    .expect("seed session");
    assert!(created, "session {id} was not created");
}

/// Model double that replays canned replies in order and records requests.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, err: ModelError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl SimulationModel for ScriptedModel {
    fn model_id(&self) -> String {
        "scripted".to_string()
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        self.requests.lock().unwrap().push(req);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("script exhausted".to_string())));
        next.map(|content| ChatReply {
            content,
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }
}
