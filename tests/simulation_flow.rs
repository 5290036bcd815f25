// tests/simulation_flow.rs
//! End-to-end simulation flow over an on-disk database and a mocked
//! Chat Completions endpoint.

mod common;

use casefile_lib::admin::NewUser;
use casefile_lib::core::catalog::{Difficulty, SimulationKind};
use casefile_lib::core::session::UserRole;
use casefile_lib::db::queries;
use casefile_lib::runtime::engine::ActionResult;
use common::{client_for, mock_openai, sse, TestApp};
use httpmock::MockServer;
use pretty_assertions::assert_eq;

fn user(email: &str, role: Option<UserRole>) -> NewUser {
    NewUser {
        email: email.to_string(),
        display_name: email.to_string(),
        role,
    }
}

#[tokio::test]
async fn assigned_simulation_is_played_scored_and_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = TestApp::open(&dir.path().join("casefile.db"));
    let server = MockServer::start_async().await;
    mock_openai(&server, &sse(&["The ledger's ", "missing pages ", "were torn in haste."])).await;
    let client = client_for(&server);

    let root = app.admin.create_user(None, user("root@example.com", None)).unwrap();
    let lead = app
        .admin
        .create_user(Some(&root.id), user("lead@example.com", Some(UserRole::OrgAdmin)))
        .unwrap();
    let player = app.admin.create_user(None, user("pat@example.com", None)).unwrap();
    assert_eq!(player.role, "player");

    let org = app.admin.create_organization(&lead.id, "Harbour Police").unwrap();
    app.admin.add_member(&lead.id, &org.id, &player.id).unwrap();
    app.admin
        .create_assignment(&lead.id, &org.id, SimulationKind::MurderMystery, None)
        .unwrap();

    let mut events = app.bus.subscribe();
    let start = app
        .engine
        .begin(&client, &player.id, SimulationKind::MurderMystery, Difficulty::Easy)
        .await
        .unwrap();
    assert_eq!(start.state.title, "The Quayside Ledger");
    assert_eq!(start.state.total_clues, 2);
    let session_id = start.session.id.clone();

    let turn = app
        .engine
        .play_turn(&client, &session_id, "/examine ledger")
        .await
        .unwrap();
    assert_eq!(turn.narrator_turn.content, "The ledger's missing pages were torn in haste.");
    assert!(matches!(turn.action, Some(ActionResult::ClueFound { newly_found: true, .. })));

    app.engine
        .play_turn(&client, &session_id, "/accuse Ines Duarte")
        .await
        .unwrap();
    let result = app.engine.finish(&client, &session_id).await.unwrap();
    assert_eq!(result.session.status, "completed");
    assert_eq!(result.score.parameters.len(), 3);
    assert!(result.score.overall > 0);

    let mut deltas = 0;
    while let Ok(event) = events.try_recv() {
        if event.event_type == "sim.narration_delta" {
            deltas += 1;
        }
    }
    assert_eq!(deltas, 6);

    let stats = app.sessions.user_stats(&player.id).unwrap();
    assert_eq!(stats.overall.as_ref().map(|s| s.games_played), Some(1));
    assert_eq!(stats.by_game_type.len(), 1);

    let dashboard = app.admin.organization_dashboard(&lead.id, &org.id).unwrap();
    assert_eq!(dashboard.completed_sessions, 1);
    let progress = dashboard
        .assignment_progress
        .iter()
        .find(|m| m.user_id == player.id)
        .unwrap();
    assert_eq!(progress.completed_assignments, 1);
    assert!(progress.outstanding.is_empty());

    let board = app.admin.leaderboard(&player.id, Some(SimulationKind::MurderMystery), 5).unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].best_score, i64::from(result.score.overall));
}

#[tokio::test]
async fn game_state_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("casefile.db");
    let server = MockServer::start_async().await;
    mock_openai(&server, &sse(&["Ash drifts from the stove."])).await;
    let client = client_for(&server);

    let (player_id, session_id) = {
        let app = TestApp::open(&path);
        let player = app.admin.create_user(None, user("pat@example.com", None)).unwrap();
        let start = app
            .engine
            .begin(&client, &player.id, SimulationKind::MurderMystery, Difficulty::Easy)
            .await
            .unwrap();
        app.engine
            .play_turn(&client, &start.session.id, "/examine ash")
            .await
            .unwrap();
        (player.id, start.session.id)
    };

    let app = TestApp::open(&path);
    let resumed = app
        .engine
        .begin(&client, &player_id, SimulationKind::MurderMystery, Difficulty::Easy)
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.session.id, session_id);
    assert_eq!(
        resumed
            .state
            .discovered_clues
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>(),
        vec!["ash"]
    );
    assert_eq!(queries::list_turns(&app.db, &session_id).unwrap().len(), 3);
    assert!(app.states.get(&session_id).unwrap().accusation.is_none());
}

#[tokio::test]
async fn deleting_a_player_removes_their_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = TestApp::open(&dir.path().join("casefile.db"));
    let server = MockServer::start_async().await;
    mock_openai(&server, &sse(&["Fog rolls in."])).await;
    let client = client_for(&server);

    let root = app.admin.create_user(None, user("root@example.com", None)).unwrap();
    let player = app.admin.create_user(None, user("pat@example.com", None)).unwrap();
    let start = app
        .engine
        .begin(&client, &player.id, SimulationKind::MurderMystery, Difficulty::Easy)
        .await
        .unwrap();

    app.admin.delete_user(&root.id, &player.id).unwrap();
    assert!(queries::get_session(&app.db, &start.session.id).unwrap().is_none());
    assert!(app.states.get(&start.session.id).is_err());
}
