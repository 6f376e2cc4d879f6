use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::team::TeamSummary;
use super::user::ApplicantProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A team creator's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn from_action(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub const fn status(self) -> JoinRequestStatus {
        match self {
            Self::Approve => JoinRequestStatus::Approved,
            Self::Reject => JoinRequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub status: JoinRequestStatus,
    #[serde(default)]
    pub message: String,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestView {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub status: JoinRequestStatus,
    pub message: String,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<String>,
    /// Filled in for the team creator's listing; `None` when the user is gone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ApplicantProfile>,
    /// Filled in for the applicant's own listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSummary>,
}

impl From<&JoinRequest> for JoinRequestView {
    fn from(req: &JoinRequest) -> Self {
        Self {
            id: req.id.clone(),
            team_id: req.team_id.clone(),
            user_id: req.user_id.clone(),
            status: req.status,
            message: req.message.clone(),
            requested_at: req.requested_at,
            responded_at: req.responded_at,
            responded_by: req.responded_by.clone(),
            applicant: None,
            team: None,
        }
    }
}
