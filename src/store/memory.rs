//! In-process store for tests. Every operation runs under one lock, which
//! gives the same atomicity the MongoDB store gets from conditional updates.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EntityStore, ParticipantOutcome, ResolveOutcome, StoreError, StoreResult};
use crate::eligibility::is_team_full;
use crate::models::{
    Decision, Event, JoinRequest, JoinRequestStatus, Message, Team, User, UserUpdate,
};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    teams: HashMap<String, Team>,
    events: HashMap<String, Event>,
    join_requests: HashMap<String, JoinRequest>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

fn newest_first<T: Clone>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.lock();
        let taken = inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return Err(StoreError::Duplicate("User already exists".into()));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.users.get(id).cloned()).collect())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(
        &self,
        id: &str,
        update: &UserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let mut inner = self.lock();
        let clash = inner.users.values().any(|u| {
            u.id != id
                && (update.username.as_deref() == Some(u.username.as_str())
                    || update.email.as_deref() == Some(u.email.as_str()))
        });
        if clash {
            return Err(StoreError::Duplicate("Username or email already taken".into()));
        }
        Ok(inner.users.get_mut(id).map(|user| {
            update.apply(user, at);
            user.clone()
        }))
    }

    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        self.lock().teams.insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.lock().teams.get(id).cloned())
    }

    async fn find_teams(&self, ids: &[String]) -> StoreResult<Vec<Team>> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.teams.get(id).cloned()).collect())
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        Ok(newest_first(self.lock().teams.values().cloned(), |t| t.created_at))
    }

    async fn teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        let inner = self.lock();
        let teams = inner.teams.values().filter(|t| t.has_member(user_id)).cloned();
        Ok(newest_first(teams, |t| t.created_at))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.lock().events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>> {
        Ok(self.lock().events.get(id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Ok(newest_first(self.lock().events.values().cloned(), |e| e.created_at))
    }

    async fn add_event_participant(
        &self,
        event_id: &str,
        team_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ParticipantOutcome> {
        let mut inner = self.lock();
        let Some(event) = inner.events.get_mut(event_id) else {
            return Ok(ParticipantOutcome::EventMissing);
        };
        if event.has_participant(team_id) {
            return Ok(ParticipantOutcome::AlreadyRegistered);
        }
        if event.participants_count() >= event.participant_rules.max_participants as usize {
            return Ok(ParticipantOutcome::EventFull);
        }
        event.participants.push(team_id.to_string());
        event.updated_at = at;
        Ok(ParticipantOutcome::Added(event.clone()))
    }

    async fn insert_join_request(&self, request: &JoinRequest) -> StoreResult<()> {
        let mut inner = self.lock();
        let pending_exists = inner.join_requests.values().any(|r| {
            r.status == JoinRequestStatus::Pending
                && r.team_id == request.team_id
                && r.user_id == request.user_id
        });
        if pending_exists {
            return Err(StoreError::Duplicate(
                "You already have a pending request for this team".into(),
            ));
        }
        inner.join_requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find_join_request(&self, id: &str) -> StoreResult<Option<JoinRequest>> {
        Ok(self.lock().join_requests.get(id).cloned())
    }

    async fn pending_requests_for_team(&self, team_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let inner = self.lock();
        let mut requests: Vec<JoinRequest> = inner
            .join_requests
            .values()
            .filter(|r| r.team_id == team_id && r.status == JoinRequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    async fn pending_requests_for_user(&self, user_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let inner = self.lock();
        let mut requests: Vec<JoinRequest> = inner
            .join_requests
            .values()
            .filter(|r| r.user_id == user_id && r.status == JoinRequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    async fn resolve_join_request(
        &self,
        request_id: &str,
        decision: Decision,
        responder_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<ResolveOutcome> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(request) = inner.join_requests.get_mut(request_id) else {
            return Ok(ResolveOutcome::RequestMissing);
        };
        if request.status.is_terminal() {
            return Ok(ResolveOutcome::AlreadyResolved(request.status));
        }

        if decision == Decision::Approve {
            let Some(team) = inner.teams.get_mut(&request.team_id) else {
                return Ok(ResolveOutcome::TeamMissing);
            };
            if !team.has_member(&request.user_id) {
                if is_team_full(team) {
                    return Ok(ResolveOutcome::TeamFull);
                }
                team.members.push(request.user_id.clone());
            }
            team.updated_at = at;
        }

        request.status = decision.status();
        request.responded_at = Some(at);
        request.responded_by = Some(responder_id.to_string());
        Ok(ResolveOutcome::Resolved(request.clone()))
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    async fn messages_for_team(&self, team_id: &str) -> StoreResult<Vec<Message>> {
        let inner = self.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}
