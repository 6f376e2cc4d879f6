//! Persistence contract used by the lifecycle controller.
//!
//! Operations that must not race (event registration, answering a join
//! request, pending-request uniqueness) are single store calls so each
//! backend can make them atomic.

#[cfg(test)]
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::AppError;
use crate::models::{Decision, Event, JoinRequest, JoinRequestStatus, Message, Team, User, UserUpdate};

pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => AppError::Conflict(what),
            StoreError::Backend(msg) => AppError::Infrastructure(msg),
        }
    }
}

/// Result of the conditional participant append.
#[derive(Debug)]
pub enum ParticipantOutcome {
    Added(Event),
    AlreadyRegistered,
    EventFull,
    EventMissing,
}

/// Result of moving a join request out of `pending`.
#[derive(Debug)]
pub enum ResolveOutcome {
    /// The request reached its terminal state; approval also added the
    /// applicant to the team.
    Resolved(JoinRequest),
    AlreadyResolved(JoinRequestStatus),
    TeamFull,
    RequestMissing,
    TeamMissing,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    /// Users whose id is in `ids`, in no particular order. Unknown ids are
    /// skipped.
    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn update_user(
        &self,
        id: &str,
        update: &UserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    // teams
    async fn insert_team(&self, team: &Team) -> StoreResult<()>;
    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>>;
    async fn find_teams(&self, ids: &[String]) -> StoreResult<Vec<Team>>;
    /// Newest first.
    async fn list_teams(&self) -> StoreResult<Vec<Team>>;
    async fn teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>>;

    // events
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>>;
    /// Newest first.
    async fn list_events(&self) -> StoreResult<Vec<Event>>;
    /// Appends `team_id` only if it is not yet registered and the event is
    /// below capacity, as one atomic step.
    async fn add_event_participant(
        &self,
        event_id: &str,
        team_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ParticipantOutcome>;

    // join requests
    /// Fails with `Duplicate` when the user already has a pending request
    /// for the team.
    async fn insert_join_request(&self, request: &JoinRequest) -> StoreResult<()>;
    async fn find_join_request(&self, id: &str) -> StoreResult<Option<JoinRequest>>;
    async fn pending_requests_for_team(&self, team_id: &str) -> StoreResult<Vec<JoinRequest>>;
    async fn pending_requests_for_user(&self, user_id: &str) -> StoreResult<Vec<JoinRequest>>;
    /// Transitions a pending request to its terminal state. On approval the
    /// capacity check and member append commit together with the
    /// transition.
    async fn resolve_join_request(
        &self,
        request_id: &str,
        decision: Decision,
        responder_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ResolveOutcome>;

    // messages
    async fn insert_message(&self, message: &Message) -> StoreResult<()>;
    /// Oldest first.
    async fn messages_for_team(&self, team_id: &str) -> StoreResult<Vec<Message>>;
}
