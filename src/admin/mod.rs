//! Users, organizations, memberships and assignments, plus the dashboards
//! built from them. Every operation takes the acting user's id and checks
//! their role before touching storage.

mod dashboard;


use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::catalog::SimulationKind;
use crate::core::session::UserRole;
use crate::db::queries::{self, AssignmentRow, OrgMemberRow, OrganizationRow, UserRow};
use crate::db::{Database, DbError};
use crate::runtime::state::GameStateStore;

pub use dashboard::{MemberProgress, OrganizationDashboard, PlatformOverview};

pub const MAX_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for AdminError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::NotFound(what) => AdminError::NotFound(what),
            DbError::Conflict(msg) => AdminError::Conflict(msg),
            other => AdminError::Db(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
}

pub struct AdminService {
    db: Arc<Database>,
    states: Arc<GameStateStore>,
}

impl AdminService {
    pub fn new(db: Arc<Database>, states: Arc<GameStateStore>) -> Self {
        Self { db, states }
    }

    // -- authorization ---------------------------------------------------

    fn actor(&self, actor_id: &str) -> Result<(UserRow, UserRole), AdminError> {
        let user = queries::get_user(&self.db, actor_id)?
            .ok_or_else(|| AdminError::Forbidden(format!("unknown acting user {actor_id}")))?;
        let role = user.role.parse::<UserRole>().unwrap_or_else(|e| {
            tracing::warn!(user_id = %user.id, "{e}; treating as player");
            UserRole::Player
        });
        Ok((user, role))
    }

    /// Fails with `Forbidden` unless `actor_id` is an admin.
    pub fn require_admin(&self, actor_id: &str) -> Result<UserRow, AdminError> {
        match self.actor(actor_id)? {
            (user, UserRole::Admin) => Ok(user),
            _ => Err(AdminError::Forbidden("admin role required".to_string())),
        }
    }

    /// Admins manage every organization; org admins only those they belong to.
    fn require_org_manager(&self, actor_id: &str, org_id: &str) -> Result<OrganizationRow, AdminError> {
        let org = queries::get_organization(&self.db, org_id)?
            .ok_or_else(|| AdminError::NotFound(format!("organization {org_id}")))?;
        match self.actor(actor_id)?.1 {
            UserRole::Admin => Ok(org),
            UserRole::OrgAdmin if queries::is_member(&self.db, org_id, actor_id)? => Ok(org),
            _ => Err(AdminError::Forbidden(format!(
                "not allowed to manage organization {org_id}"
            ))),
        }
    }

    fn require_org_reader(&self, actor_id: &str, org_id: &str) -> Result<OrganizationRow, AdminError> {
        let org = queries::get_organization(&self.db, org_id)?
            .ok_or_else(|| AdminError::NotFound(format!("organization {org_id}")))?;
        if self.actor(actor_id)?.1 == UserRole::Admin
            || queries::is_member(&self.db, org_id, actor_id)?
        {
            Ok(org)
        } else {
            Err(AdminError::Forbidden(format!(
                "not a member of organization {org_id}"
            )))
        }
    }

    // -- users -----------------------------------------------------------

    /// Create a user. The very first user becomes an admin; without an
    /// acting user only players can be created (self-registration); other
    /// roles need an admin.
    pub fn create_user(&self, actor_id: Option<&str>, new_user: NewUser) -> Result<UserRow, AdminError> {
        let email = new_user.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(AdminError::InvalidInput(format!("invalid email: {}", new_user.email)));
        }
        let display_name = new_user.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AdminError::InvalidInput("display name is empty".to_string()));
        }

        let requested = new_user.role.unwrap_or(UserRole::Player);
        let denied = self.authorize_new_user(actor_id, requested).err();

        let now = Utc::now().to_rfc3339();
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            email,
            display_name,
            role: requested.as_str().to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        // The first user is let through regardless and stored as an admin.
        let Some(row) = queries::insert_user_bootstrapping(&self.db, &row, denied.is_none())? else {
            return Err(denied.unwrap_or_else(|| {
                AdminError::Forbidden(format!("creating a {requested} was not allowed"))
            }));
        };
        tracing::info!(user_id = %row.id, role = %row.role, "user created");
        Ok(row)
    }

    /// Role checks for a new user once at least one user exists.
    fn authorize_new_user(&self, actor_id: Option<&str>, requested: UserRole) -> Result<(), AdminError> {
        match actor_id {
            Some(actor) if requested != UserRole::Player => self.require_admin(actor).map(|_| ()),
            Some(actor) => self.actor(actor).map(|_| ()),
            None if requested == UserRole::Player => Ok(()),
            None => Err(AdminError::Forbidden(format!(
                "creating a {requested} requires an admin"
            ))),
        }
    }

    pub fn get_user(&self, actor_id: &str, user_id: &str) -> Result<UserRow, AdminError> {
        let (_, role) = self.actor(actor_id)?;
        if actor_id != user_id && role == UserRole::Player {
            return Err(AdminError::Forbidden("players can only view themselves".to_string()));
        }
        queries::get_user(&self.db, user_id)?
            .ok_or_else(|| AdminError::NotFound(format!("user {user_id}")))
    }

    pub fn list_users(&self, actor_id: &str) -> Result<Vec<UserRow>, AdminError> {
        self.require_admin(actor_id)?;
        Ok(queries::list_users(&self.db)?)
    }

    /// Users may rename themselves; changing anyone's role needs an admin,
    /// and the last admin cannot be demoted.
    pub fn update_user(
        &self,
        actor_id: &str,
        user_id: &str,
        update: UserUpdate,
    ) -> Result<UserRow, AdminError> {
        let (_, actor_role) = self.actor(actor_id)?;
        let current = queries::get_user(&self.db, user_id)?
            .ok_or_else(|| AdminError::NotFound(format!("user {user_id}")))?;

        let role_change = update
            .role
            .filter(|r| r.as_str() != current.role);
        if actor_role != UserRole::Admin && (actor_id != user_id || role_change.is_some()) {
            return Err(AdminError::Forbidden("admin role required".to_string()));
        }
        if current.role == UserRole::Admin.as_str()
            && role_change.is_some()
            && queries::count_users_with_role(&self.db, UserRole::Admin.as_str())? <= 1
        {
            return Err(AdminError::Conflict("cannot demote the last admin".to_string()));
        }

        let display_name = match update.display_name.as_deref().map(str::trim) {
            Some("") => return Err(AdminError::InvalidInput("display name is empty".to_string())),
            Some(name) => name.to_string(),
            None => current.display_name.clone(),
        };
        let role = role_change.map(|r| r.as_str().to_string()).unwrap_or(current.role);

        let now = Utc::now().to_rfc3339();
        if !queries::update_user(&self.db, user_id, &display_name, &role, &now)? {
            return Err(AdminError::NotFound(format!("user {user_id}")));
        }
        queries::get_user(&self.db, user_id)?
            .ok_or_else(|| AdminError::NotFound(format!("user {user_id}")))
    }

    /// Delete a user with their sessions, transcripts, game state and stats.
    pub fn delete_user(&self, actor_id: &str, user_id: &str) -> Result<(), AdminError> {
        self.require_admin(actor_id)?;
        if actor_id == user_id {
            return Err(AdminError::InvalidInput("admins cannot delete themselves".to_string()));
        }
        if queries::get_user(&self.db, user_id)?.is_none() {
            return Err(AdminError::NotFound(format!("user {user_id}")));
        }
        let sessions = queries::list_sessions_for_user(&self.db, user_id)?;
        queries::delete_user_cascade(&self.db, user_id)?;
        for session in &sessions {
            self.states.evict(&session.id);
        }
        tracing::info!(user_id, sessions = sessions.len(), "user deleted");
        Ok(())
    }

    // -- organizations ---------------------------------------------------

    /// Admins and org admins can create organizations; the creator joins it.
    pub fn create_organization(&self, actor_id: &str, name: &str) -> Result<OrganizationRow, AdminError> {
        let (actor, role) = self.actor(actor_id)?;
        if role == UserRole::Player {
            return Err(AdminError::Forbidden("players cannot create organizations".to_string()));
        }
        let name = validated_name(name)?;
        let now = Utc::now().to_rfc3339();
        let row = OrganizationRow {
            id: Uuid::new_v4().to_string(),
            name,
            created_by: actor.id.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        queries::insert_organization(&self.db, &row)?;
        queries::add_member(&self.db, &row.id, &actor.id, &now)?;
        tracing::info!(org_id = %row.id, "organization created");
        Ok(row)
    }

    pub fn get_organization(&self, actor_id: &str, org_id: &str) -> Result<OrganizationRow, AdminError> {
        self.require_org_reader(actor_id, org_id)
    }

    /// Admins see every organization, everyone else the ones they belong to.
    pub fn list_organizations(&self, actor_id: &str) -> Result<Vec<OrganizationRow>, AdminError> {
        match self.actor(actor_id)?.1 {
            UserRole::Admin => Ok(queries::list_organizations(&self.db)?),
            _ => Ok(queries::list_organizations_for_user(&self.db, actor_id)?),
        }
    }

    pub fn rename_organization(
        &self,
        actor_id: &str,
        org_id: &str,
        name: &str,
    ) -> Result<OrganizationRow, AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        let name = validated_name(name)?;
        queries::rename_organization(&self.db, org_id, &name, &Utc::now().to_rfc3339())?;
        queries::get_organization(&self.db, org_id)?
            .ok_or_else(|| AdminError::NotFound(format!("organization {org_id}")))
    }

    pub fn delete_organization(&self, actor_id: &str, org_id: &str) -> Result<(), AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        queries::delete_organization_cascade(&self.db, org_id)?;
        tracing::info!(org_id, "organization deleted");
        Ok(())
    }

    // -- memberships -----------------------------------------------------

    pub fn add_member(&self, actor_id: &str, org_id: &str, user_id: &str) -> Result<(), AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        if queries::get_user(&self.db, user_id)?.is_none() {
            return Err(AdminError::NotFound(format!("user {user_id}")));
        }
        queries::add_member(&self.db, org_id, user_id, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    pub fn remove_member(&self, actor_id: &str, org_id: &str, user_id: &str) -> Result<bool, AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        Ok(queries::remove_member(&self.db, org_id, user_id)?)
    }

    pub fn list_members(&self, actor_id: &str, org_id: &str) -> Result<Vec<OrgMemberRow>, AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        Ok(queries::list_members(&self.db, org_id)?)
    }

    // -- assignments -----------------------------------------------------

    pub fn create_assignment(
        &self,
        actor_id: &str,
        org_id: &str,
        kind: SimulationKind,
        due_at: Option<String>,
    ) -> Result<AssignmentRow, AdminError> {
        self.require_org_manager(actor_id, org_id)?;
        if kind == SimulationKind::General {
            return Err(AdminError::InvalidInput("assign a specific simulation".to_string()));
        }
        let due_at = due_at
            .map(|raw| {
                chrono::DateTime::parse_from_rfc3339(raw.trim())
                    .map(|ts| ts.with_timezone(&Utc).to_rfc3339())
                    .map_err(|e| AdminError::InvalidInput(format!("invalid due date {raw:?}: {e}")))
            })
            .transpose()?;

        let row = AssignmentRow {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            game_type: kind.tag().to_string(),
            due_at,
            created_by: actor_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        queries::insert_assignment(&self.db, &row)?;
        Ok(row)
    }

    /// Members can see their organization's assignments.
    pub fn list_assignments(&self, actor_id: &str, org_id: &str) -> Result<Vec<AssignmentRow>, AdminError> {
        self.require_org_reader(actor_id, org_id)?;
        Ok(queries::list_assignments(&self.db, org_id)?)
    }

    pub fn remove_assignment(&self, actor_id: &str, assignment_id: &str) -> Result<(), AdminError> {
        let assignment = queries::get_assignment(&self.db, assignment_id)?
            .ok_or_else(|| AdminError::NotFound(format!("assignment {assignment_id}")))?;
        self.require_org_manager(actor_id, &assignment.org_id)?;
        queries::delete_assignment(&self.db, assignment_id)?;
        Ok(())
    }
}

fn validated_name(name: &str) -> Result<String, AdminError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::InvalidInput("name is empty".to_string()));
    }
    if name.chars().count() > 120 {
        return Err(AdminError::InvalidInput("name is longer than 120 characters".to_string()));
    }
    Ok(name.to_string())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
