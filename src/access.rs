//! Authorization predicates for team-scoped operations.

use crate::error::{AppError, AppResult};
use crate::models::Team;

pub fn is_team_creator(team: &Team, user_id: &str) -> bool {
    team.created_by == user_id
}

pub fn is_team_member(team: &Team, user_id: &str) -> bool {
    team.has_member(user_id)
}

/// Viewing and answering join requests is reserved to the team creator.
pub fn require_team_creator(team: &Team, user_id: &str, action: &str) -> AppResult<()> {
    if is_team_creator(team, user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Only team creator can {action}")))
    }
}

/// The chat channel is open to members and to the creator.
pub fn require_chat_access(team: &Team, user_id: &str, action: &str) -> AppResult<()> {
    if is_team_member(team, user_id) || is_team_creator(team, user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Not authorized to {action}")))
    }
}
