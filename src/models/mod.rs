pub mod event;
pub mod join_request;
pub mod lenient;
pub mod message;
pub mod team;
pub mod user;

use uuid::Uuid;

pub use event::{Event, EventView, NewEvent};
pub use join_request::{Decision, JoinRequest, JoinRequestStatus, JoinRequestView};
pub use message::{Message, MessageView, NewMessage};
pub use team::{NewTeam, Team, TeamDetails, TeamView};
pub use user::{User, UserUpdate, UserView};

/// Document identifiers are random UUIDs stored as strings in `_id`.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trims an optional string and drops it when nothing is left.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
