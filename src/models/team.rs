use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eligibility::is_team_full;

/// Stored team document. `members` always contains `created_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub aim: String,
    #[serde(default)]
    pub description: String,
    pub max_members: u32,
    pub members: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

/// Input for creating a team. Accepts the legacy `teamName`/`teamAim` keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    #[serde(alias = "teamName")]
    pub name: Option<String>,
    #[serde(alias = "teamAim")]
    pub aim: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "super::lenient::opt_number")]
    pub max_members: Option<i64>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: String,
    pub name: String,
    pub aim: String,
    pub description: String,
    pub max_members: u32,
    pub members: Vec<String>,
    pub skills: Vec<String>,
    pub created_by: String,
    pub members_count: usize,
    pub is_full: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Team> for TeamView {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            aim: team.aim.clone(),
            description: team.description.clone(),
            max_members: team.max_members,
            members: team.members.clone(),
            skills: team.skills.clone(),
            created_by: team.created_by.clone(),
            members_count: team.member_count(),
            is_full: is_team_full(team),
            created_at: team.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub aim: String,
    pub description: String,
    pub max_members: u32,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            aim: team.aim.clone(),
            description: team.description.clone(),
            max_members: team.max_members,
        }
    }
}

/// Team as seen by a particular caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetails {
    pub team: TeamView,
    pub is_creator: bool,
    pub is_member: bool,
    pub can_join: bool,
}
