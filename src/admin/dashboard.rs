use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AdminError, AdminService, MAX_LEADERBOARD_LIMIT};
use crate::core::catalog::SimulationKind;
use crate::core::session::SessionStatus;
use crate::db::queries::{
    self, AssignmentRow, DashboardTable, GameSessionRow, GameTypeBreakdownRow, LeaderboardRow,
    OrganizationRow,
};

#[derive(Debug, Clone, Serialize)]
pub struct MemberProgress {
    pub user_id: String,
    pub display_name: String,
    pub completed_assignments: usize,
    pub total_assignments: usize,
    /// Game types still to play, in assignment order.
    pub outstanding: Vec<String>,
    pub overdue: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationDashboard {
    pub organization: OrganizationRow,
    pub member_count: i64,
    pub completed_sessions: i64,
    pub average_score: Option<f64>,
    pub by_game_type: Vec<GameTypeBreakdownRow>,
    pub assignment_progress: Vec<MemberProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformOverview {
    pub users: i64,
    pub organizations: i64,
    pub sessions_by_status: BTreeMap<String, i64>,
    pub average_score: Option<f64>,
}

impl AdminService {
    pub fn organization_dashboard(
        &self,
        actor_id: &str,
        org_id: &str,
    ) -> Result<OrganizationDashboard, AdminError> {
        let organization = self.require_org_manager(actor_id, org_id)?;
        let members = queries::list_members(&self.db, org_id)?;
        let assignments = queries::list_assignments(&self.db, org_id)?;
        let by_game_type = queries::org_breakdown_by_game_type(&self.db, org_id)?;
        let now = Utc::now();

        let mut assignment_progress = Vec::with_capacity(members.len());
        for member in &members {
            let sessions = queries::list_sessions_for_user(&self.db, &member.user_id)?;
            assignment_progress.push(member_progress(
                &member.user_id,
                &member.display_name,
                &assignments,
                &sessions,
                now,
            ));
        }

        Ok(OrganizationDashboard {
            organization,
            member_count: members.len() as i64,
            completed_sessions: by_game_type.iter().map(|b| b.completed).sum(),
            average_score: queries::org_average_score(&self.db, org_id)?,
            by_game_type,
            assignment_progress,
        })
    }

    pub fn platform_overview(&self, actor_id: &str) -> Result<PlatformOverview, AdminError> {
        self.require_admin(actor_id)?;
        let mut sessions_by_status: BTreeMap<String, i64> = [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
        for (status, count) in queries::count_sessions_by_status(&self.db)? {
            sessions_by_status.insert(status, count);
        }

        Ok(PlatformOverview {
            users: queries::count_rows(&self.db, DashboardTable::Users)?,
            organizations: queries::count_rows(&self.db, DashboardTable::Organizations)?,
            sessions_by_status,
            average_score: queries::average_completed_score(&self.db)?,
        })
    }

    /// Best scores overall or for one simulation; any signed-in user may look.
    pub fn leaderboard(
        &self,
        actor_id: &str,
        kind: Option<SimulationKind>,
        limit: i64,
    ) -> Result<Vec<LeaderboardRow>, AdminError> {
        self.actor(actor_id)?;
        let limit = limit.clamp(1, MAX_LEADERBOARD_LIMIT);
        Ok(queries::leaderboard(&self.db, kind.map(|k| k.tag()), limit)?)
    }
}

/// An assignment counts as done once the member completes a session of that
/// game type after it was handed out.
fn member_progress(
    user_id: &str,
    display_name: &str,
    assignments: &[AssignmentRow],
    sessions: &[GameSessionRow],
    now: DateTime<Utc>,
) -> MemberProgress {
    let mut completed = 0;
    let mut outstanding = Vec::new();
    let mut overdue = 0;

    for assignment in assignments {
        let assigned_at = parse_ts(&assignment.created_at);
        let done = sessions.iter().any(|s| {
            s.game_type == assignment.game_type
                && s.status == SessionStatus::Completed.as_str()
                && match (s.ended_at.as_deref().and_then(parse_ts), assigned_at) {
                    (Some(ended), Some(assigned)) => ended >= assigned,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
        });

        if done {
            completed += 1;
            continue;
        }
        outstanding.push(assignment.game_type.clone());
        if assignment
            .due_at
            .as_deref()
            .and_then(parse_ts)
            .is_some_and(|due| due < now)
        {
            overdue += 1;
        }
    }

    MemberProgress {
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        completed_assignments: completed,
        total_assignments: assignments.len(),
        outstanding,
        overdue,
    }
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
