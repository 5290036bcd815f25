//! Turn-based simulation engine: generate a scenario, narrate player turns,
//! evaluate and close the session.

use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::bus::event_types::{
    CATEGORY_SESSION, CATEGORY_SIM, EVENT_SESSION_ABANDONED, EVENT_SESSION_COMPLETED,
    EVENT_SESSION_STARTED, EVENT_SIM_EVALUATED, EVENT_SIM_NARRATION_DELTA, EVENT_SIM_TURN,
};
use crate::bus::{emit_and_record, EventBus};
use crate::core::case::CaseFile;
use crate::core::catalog::{Difficulty, SimulationKind};
use crate::core::scoring::{score_for_kind, SimulationScore};
use crate::core::session::{SessionStatus, TurnRole};
use crate::db::queries::{self, GameSessionRow, TurnRow};
use crate::db::{Database, DbError};
use crate::model::shared::clean_narration;
use crate::model::{parse_json_payload, ModelError, SimulationModel};
use crate::runtime::generation_settings::effective_generation_settings;
use crate::runtime::prompts;
use crate::runtime::sessions::{GameSessionManager, SessionError, SessionOutcome};
use crate::runtime::state::{GameStateStore, PublicGameState, StateError};

pub const MAX_PLAYER_INPUT_CHARS: usize = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("generated scenario was unusable: {0}")]
    InvalidCase(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A parsed line of player input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Say(String),
    Examine(String),
    Interview(String),
    Note(String),
    Hint,
    Accuse(String),
}

impl PlayerAction {
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let input = input.trim();
        let Some(command) = input.strip_prefix('/') else {
            return Ok(PlayerAction::Say(input.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        let require_arg = |what: &str| {
            if arg.is_empty() {
                Err(EngineError::InvalidInput(format!("/{name} needs {what}")))
            } else {
                Ok(arg.to_string())
            }
        };

        match name.to_ascii_lowercase().as_str() {
            "examine" | "inspect" => Ok(PlayerAction::Examine(require_arg("a clue")?)),
            "interview" | "ask" => Ok(PlayerAction::Interview(require_arg("a name")?)),
            "note" => Ok(PlayerAction::Note(require_arg("some text")?)),
            "hint" => Ok(PlayerAction::Hint),
            "accuse" => Ok(PlayerAction::Accuse(require_arg("a name")?)),
            other => Err(EngineError::InvalidInput(format!("unknown command /{other}"))),
        }
    }
}

/// Structured result of a game action, returned alongside the narration.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionResult {
    ClueFound { clue_id: String, description: String, newly_found: bool },
    Interviewed { suspect: String },
    NoteAdded { total_notes: usize },
    Hint { text: String, hints_used: u32 },
    Accused { suspect: String, correct: bool },
    Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationStart {
    pub session: GameSessionRow,
    pub resumed: bool,
    pub opening: String,
    pub state: PublicGameState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub player_turn: TurnRow,
    pub narrator_turn: TurnRow,
    pub action: Option<ActionResult>,
    pub state: PublicGameState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub session: GameSessionRow,
    pub score: SimulationScore,
    pub feedback: String,
}

pub struct SimulationEngine {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    sessions: Arc<GameSessionManager>,
    states: Arc<GameStateStore>,
}

impl SimulationEngine {
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        sessions: Arc<GameSessionManager>,
        states: Arc<GameStateStore>,
    ) -> Self {
        Self {
            db,
            bus,
            sessions,
            states,
        }
    }

    /// Start a simulation, or resume the user's active one for this kind.
    pub async fn begin(
        &self,
        model: &dyn SimulationModel,
        user_id: &str,
        kind: SimulationKind,
        difficulty: Difficulty,
    ) -> Result<SimulationStart, EngineError> {
        let (start, _guard) = self.sessions.begin_exclusive(user_id, kind.tag()).await?;
        let session = start.session;

        if !start.created {
            match self.states.public_view(&session.id) {
                Ok(state) => {
                    let opening = queries::list_turns(&self.db, &session.id)?
                        .into_iter()
                        .find(|t| t.role == TurnRole::Narrator.as_str())
                        .map(|t| t.content)
                        .unwrap_or_default();
                    return Ok(SimulationStart {
                        session,
                        resumed: true,
                        opening,
                        state,
                    });
                }
                Err(StateError::NotFound(_)) => {
                    tracing::warn!(session_id = %session.id, "active session has no game state; generating one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        match self.setup_scenario(model, &session, kind, difficulty).await {
            Ok((opening, state)) => {
                emit_and_record(
                    &self.db,
                    &self.bus,
                    CATEGORY_SESSION,
                    EVENT_SESSION_STARTED,
                    Some(session.id.clone()),
                    json!({
                        "session_id": session.id,
                        "user_id": user_id,
                        "game_type": kind.tag(),
                        "difficulty": difficulty.as_str(),
                        "title": state.title,
                    }),
                )?;
                Ok(SimulationStart {
                    session,
                    resumed: false,
                    opening,
                    state,
                })
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, "scenario setup failed: {e}");
                self.states.evict(&session.id);
                if self.sessions.abandon_session(&session.id)? {
                    self.emit_abandoned(&session.id, "scenario setup failed");
                }
                Err(e)
            }
        }
    }

    async fn setup_scenario(
        &self,
        model: &dyn SimulationModel,
        session: &GameSessionRow,
        kind: SimulationKind,
        difficulty: Difficulty,
    ) -> Result<(String, PublicGameState), EngineError> {
        let settings = effective_generation_settings(&self.db);
        let req = prompts::case_generation_request(kind, difficulty, &settings.case_generation);
        tracing::debug!(session_id = %session.id, model = %model.model_id(), "generating scenario");
        let reply = model.chat(req).await?;

        let payload = parse_json_payload(&reply.content)
            .ok_or_else(|| EngineError::InvalidCase("reply did not contain a JSON object".to_string()))?;
        let mut case = CaseFile::from_model_json(payload, kind, difficulty)
            .map_err(|e| EngineError::InvalidCase(e.to_string()))?;
        // Models tend to list the culprit first.
        case.suspects.shuffle(&mut rand::thread_rng());

        let mut opening = clean_narration(&case.opening);
        if opening.is_empty() {
            opening = format!("{}. {}", case.title, case.setting);
        }

        let state = self.states.create(&session.id, kind, difficulty, case)?;
        self.append_turn(&session.id, TurnRole::Narrator, &opening)?;
        Ok((opening, (&state).into()))
    }

    pub async fn play_turn(
        &self,
        model: &dyn SimulationModel,
        session_id: &str,
        player_input: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let input = player_input.trim();
        if input.is_empty() {
            return Err(EngineError::InvalidInput("input is empty".to_string()));
        }
        if input.chars().count() > MAX_PLAYER_INPUT_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "input exceeds {MAX_PLAYER_INPUT_CHARS} characters"
            )));
        }
        let action = PlayerAction::parse(input)?;
        self.require_active(session_id)?;

        // Nothing from this turn is kept unless the narrator answers.
        let snapshot = self.states.get(session_id)?;
        let (action_result, context) = self.apply_action(session_id, &action)?;
        let narration = match self.narrate(model, session_id, input, context.as_deref()).await {
            Ok(narration) => narration,
            Err(e) => {
                if let Err(restore_err) = self.states.restore(snapshot) {
                    tracing::error!(session_id, "failed to roll back game state: {restore_err}");
                }
                return Err(e);
            }
        };

        let player_turn = self.append_turn(session_id, TurnRole::Player, input)?;
        self.states.record_turn(session_id)?;
        let narrator_turn = self.append_turn(session_id, TurnRole::Narrator, &narration)?;

        Ok(TurnOutcome {
            player_turn,
            narrator_turn,
            action: action_result,
            state: self.states.public_view(session_id)?,
        })
    }

    /// Stream the narrator's reply to `input`, which is not yet in the
    /// stored transcript.
    async fn narrate(
        &self,
        model: &dyn SimulationModel,
        session_id: &str,
        input: &str,
        context: Option<&str>,
    ) -> Result<String, EngineError> {
        let state = self.states.get(session_id)?;
        let mut transcript = queries::list_turns(&self.db, session_id)?;
        let next_idx = transcript.last().map_or(0, |t| t.idx + 1);
        transcript.push(TurnRow {
            id: String::new(),
            session_id: session_id.to_string(),
            idx: next_idx,
            role: TurnRole::Player.as_str().to_string(),
            content: input.to_string(),
            created_at: Utc::now().to_rfc3339(),
        });
        let settings = effective_generation_settings(&self.db);
        let req = prompts::narration_request(&state, &transcript, context, &settings.narration);

        let bus = self.bus.clone();
        let delta_session = session_id.to_string();
        let mut on_delta = move |delta: String| {
            bus.emit(
                CATEGORY_SIM,
                EVENT_SIM_NARRATION_DELTA,
                Some(delta_session.clone()),
                json!({ "delta": delta }),
            );
        };
        let reply = model.chat_streaming(req, &mut on_delta).await?;

        let narration = clean_narration(&reply.content);
        if narration.is_empty() {
            return Err(ModelError::InvalidResponse("narrator reply was empty".to_string()).into());
        }
        Ok(narration)
    }

    /// Apply the game side of an action. Lookups that miss become a rejected
    /// action the narrator describes, rather than a failed turn.
    fn apply_action(
        &self,
        session_id: &str,
        action: &PlayerAction,
    ) -> Result<(Option<ActionResult>, Option<String>), EngineError> {
        let outcome = match action {
            PlayerAction::Say(_) => return Ok((None, None)),
            PlayerAction::Examine(key) => self.states.collect_clue(session_id, key).map(|found| {
                let context = format!(
                    "The player examined clue {} ({}).{}",
                    found.clue.id,
                    found.clue.description,
                    if found.newly_found { "" } else { " They had already found it." }
                );
                (
                    ActionResult::ClueFound {
                        clue_id: found.clue.id,
                        description: found.clue.description,
                        newly_found: found.newly_found,
                    },
                    context,
                )
            }),
            PlayerAction::Interview(name) => self.states.interview(session_id, name).map(|s| {
                let context = format!("The player interviews {}. Answer in their voice.", s.name);
                (ActionResult::Interviewed { suspect: s.name }, context)
            }),
            PlayerAction::Note(text) => self.states.add_note(session_id, text).map(|total| {
                (
                    ActionResult::NoteAdded { total_notes: total },
                    "The player wrote a note in their notebook.".to_string(),
                )
            }),
            PlayerAction::Hint => self.states.use_hint(session_id).map(|hint| {
                let context = format!("The player asked for a hint. Work this in subtly: {}", hint.text);
                (
                    ActionResult::Hint {
                        text: hint.text,
                        hints_used: hint.hints_used,
                    },
                    context,
                )
            }),
            PlayerAction::Accuse(name) => self.states.accuse(session_id, name).map(|acc| {
                let context = format!(
                    "The player formally accused {}. The accusation is {}. Reveal the truth.",
                    acc.suspect,
                    if acc.correct { "correct" } else { "wrong" }
                );
                (
                    ActionResult::Accused {
                        suspect: acc.suspect,
                        correct: acc.correct,
                    },
                    context,
                )
            }),
        };

        match outcome {
            Ok((result, context)) => Ok((Some(result), Some(context))),
            Err(
                e @ (StateError::UnknownClue(_)
                | StateError::UnknownSuspect(_)
                | StateError::InvalidState(_)),
            ) => {
                let reason = e.to_string();
                let context = format!("The player's action could not be carried out: {reason}.");
                Ok((Some(ActionResult::Rejected { reason }), Some(context)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluate the transcript, score it and close the session.
    pub async fn finish(
        &self,
        model: &dyn SimulationModel,
        session_id: &str,
    ) -> Result<SimulationResult, EngineError> {
        self.require_active(session_id)?;
        let state = self.states.get(session_id)?;
        let transcript = queries::list_turns(&self.db, session_id)?;

        let settings = effective_generation_settings(&self.db);
        let req = prompts::evaluation_request(&state, &transcript, &settings.evaluation);
        let reply = model.chat(req).await?;
        let feedback = reply.content.trim().to_string();

        let decision = state.decision_data();
        let score = score_for_kind(&feedback, state.kind, Some(&decision));
        let now = Utc::now().to_rfc3339();

        queries::upsert_evaluation(
            &self.db,
            &queries::EvaluationRow {
                session_id: session_id.to_string(),
                overall: i64::from(score.overall),
                rating: score.rating.label().to_string(),
                summary: score.summary.clone(),
                breakdown_json: serde_json::to_string(&score.parameters)
                    .map_err(DbError::from)?,
                raw_text: feedback.clone(),
                created_at: now,
            },
        )?;

        let evidence = json!({
            "discovered_clues": state.discovered_clues,
            "interviewed": state.interviewed,
            "notes": state.notes,
            "accusation": state.accusation,
            "hints_used": state.hints_used,
            "turns": state.turns,
        });
        let session = self.sessions.end_session(
            session_id,
            SessionOutcome {
                score: Some(score.overall),
                evidence: Some(evidence),
            },
        )?;
        self.states.evict(session_id);

        emit_and_record(
            &self.db,
            &self.bus,
            CATEGORY_SIM,
            EVENT_SIM_EVALUATED,
            Some(session_id.to_string()),
            json!({
                "overall": score.overall,
                "rating": score.rating.label(),
                "summary": score.summary,
                "parameters": score.parameters,
            }),
        )?;
        emit_and_record(
            &self.db,
            &self.bus,
            CATEGORY_SESSION,
            EVENT_SESSION_COMPLETED,
            Some(session_id.to_string()),
            json!({
                "session_id": session_id,
                "score": score.overall,
                "duration_minutes": session.duration_minutes,
            }),
        )?;

        Ok(SimulationResult {
            session,
            score,
            feedback,
        })
    }

    pub fn abandon(&self, session_id: &str) -> Result<bool, EngineError> {
        let abandoned = self.sessions.abandon_session(session_id)?;
        self.states.evict(session_id);
        if abandoned {
            self.emit_abandoned(session_id, "abandoned by player");
        }
        Ok(abandoned)
    }

    pub fn transcript(&self, session_id: &str) -> Result<Vec<TurnRow>, EngineError> {
        self.sessions.get_session(session_id)?;
        Ok(queries::list_turns(&self.db, session_id)?)
    }

    fn require_active(&self, session_id: &str) -> Result<GameSessionRow, EngineError> {
        let session = self.sessions.get_session(session_id)?;
        if session.status != SessionStatus::Active.as_str() {
            return Err(SessionError::InvalidState(format!(
                "session {session_id} is {}",
                session.status
            ))
            .into());
        }
        Ok(session)
    }

    fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<TurnRow, EngineError> {
        let turn = queries::append_turn(
            &self.db,
            &Uuid::new_v4().to_string(),
            session_id,
            role.as_str(),
            content,
            &Utc::now().to_rfc3339(),
        )?;
        emit_and_record(
            &self.db,
            &self.bus,
            CATEGORY_SIM,
            EVENT_SIM_TURN,
            Some(session_id.to_string()),
            json!({ "idx": turn.idx, "role": turn.role, "content": turn.content }),
        )?;
        Ok(turn)
    }

    fn emit_abandoned(&self, session_id: &str, reason: &str) {
        if let Err(e) = emit_and_record(
            &self.db,
            &self.bus,
            CATEGORY_SESSION,
            EVENT_SESSION_ABANDONED,
            Some(session_id.to_string()),
            json!({ "session_id": session_id, "reason": reason }),
        ) {
            tracing::warn!(session_id, "failed to record abandon event: {e}");
        }
    }
}
