//! Team, event and join-request state transitions.
//!
//! Each operation validates its invariants against freshly loaded records and
//! then commits through a single conditional store call, so concurrent
//! requests cannot both pass a check and both apply.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::access::{is_team_creator, is_team_member, require_chat_access, require_team_creator};
use crate::eligibility::{
    check_event_joinable, is_team_full, team_size_satisfies_event_rules, TeamSizeRange,
};
use crate::error::{AppError, AppResult};
use crate::models::event::{ParticipantRules, DEFAULT_ELIGIBILITY, DEFAULT_MAX_PARTICIPANTS};
use crate::models::team::TeamSummary;
use crate::models::user::{ApplicantProfile, SenderProfile};
use crate::models::{
    new_id, non_blank, Decision, Event, JoinRequest, JoinRequestStatus, JoinRequestView, Message,
    MessageView, NewEvent, NewMessage, NewTeam, Team, TeamDetails, TeamView, User,
};
use crate::store::{EntityStore, ParticipantOutcome, ResolveOutcome};

pub const MIN_TEAM_CAPACITY: i64 = 2;

#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn EntityStore>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn load_team(&self, team_id: &str) -> AppResult<Team> {
        self.store
            .find_team(team_id)
            .await?
            .ok_or_else(|| AppError::not_found("Team not found"))
    }

    async fn load_event(&self, event_id: &str) -> AppResult<Event> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event not found"))
    }

    async fn users_by_id(&self, mut ids: Vec<String>) -> AppResult<HashMap<String, User>> {
        ids.sort();
        ids.dedup();
        let users = self.store.find_users(&ids).await?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    /// Creates a team whose only member is its creator.
    pub async fn create_team(
        &self,
        creator_id: &str,
        input: NewTeam,
        now: DateTime<Utc>,
    ) -> AppResult<Team> {
        let (Some(name), Some(aim), Some(max_members)) = (
            non_blank(input.name.as_deref()),
            non_blank(input.aim.as_deref()),
            input.max_members,
        ) else {
            return Err(AppError::validation(
                "teamName, teamAim and maxMembers are required",
            ));
        };
        if max_members < MIN_TEAM_CAPACITY {
            return Err(AppError::validation(format!(
                "maxMembers must be at least {MIN_TEAM_CAPACITY}"
            )));
        }
        let max_members = u32::try_from(max_members)
            .map_err(|_| AppError::validation("maxMembers is too large"))?;

        let team = Team {
            id: new_id(),
            name,
            aim,
            description: non_blank(input.description.as_deref()).unwrap_or_default(),
            max_members,
            members: vec![creator_id.to_string()],
            skills: input
                .skills
                .unwrap_or_default()
                .iter()
                .filter_map(|s| non_blank(Some(s.as_str())))
                .collect(),
            created_by: creator_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_team(&team).await?;
        info!("Team {} created by {}", team.id, creator_id);
        Ok(team)
    }

    pub async fn list_teams(&self) -> AppResult<Vec<Team>> {
        Ok(self.store.list_teams().await?)
    }

    pub async fn teams_of_user(&self, user_id: &str) -> AppResult<Vec<Team>> {
        Ok(self.store.teams_with_member(user_id).await?)
    }

    pub async fn team_details(&self, team_id: &str, viewer_id: &str) -> AppResult<TeamDetails> {
        let team = self.load_team(team_id).await?;
        let is_member = is_team_member(&team, viewer_id);
        Ok(TeamDetails {
            is_creator: is_team_creator(&team, viewer_id),
            can_join: !is_team_full(&team) && !is_member,
            is_member,
            team: TeamView::from(&team),
        })
    }

    pub async fn create_event(
        &self,
        creator_id: &str,
        input: NewEvent,
        now: DateTime<Utc>,
    ) -> AppResult<Event> {
        let title = non_blank(input.title.as_deref())
            .ok_or_else(|| AppError::validation("title is required"))?;
        let description = non_blank(input.description.as_deref())
            .ok_or_else(|| AppError::validation("description is required"))?;
        let category = non_blank(input.category.as_deref())
            .ok_or_else(|| AppError::validation("category is required"))?;
        let dates = input
            .dates
            .ok_or_else(|| AppError::validation("dates are required"))?;

        if dates.registration_starts > dates.registration_ends {
            return Err(AppError::validation(
                "registrationStarts must not be after registrationEnds",
            ));
        }
        if dates.event_start > dates.event_end {
            return Err(AppError::validation("eventStart must not be after eventEnd"));
        }
        if dates.registration_ends > dates.event_start {
            warn!("Event '{}' keeps registration open past its start", title);
        }

        let rules = input.participant_rules.unwrap_or_default();
        let range = TeamSizeRange::resolve(rules.min_team_size, rules.max_team_size);
        if range.min == 0 {
            return Err(AppError::validation("minTeamSize must be at least 1"));
        }
        if range.min > range.max {
            return Err(AppError::validation(format!(
                "Team size range {range} is empty"
            )));
        }
        let max_participants = rules.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
        if max_participants == 0 {
            return Err(AppError::validation("maxParticipants must be at least 1"));
        }
        let registration_fee = rules.registration_fee.unwrap_or(0.0);
        if !registration_fee.is_finite() || registration_fee < 0.0 {
            return Err(AppError::validation("registrationFee must not be negative"));
        }

        let event = Event {
            id: new_id(),
            title,
            description,
            dates,
            location: non_blank(input.location.as_deref()).unwrap_or_default(),
            created_by: creator_id.to_string(),
            category,
            tags: input.tags.iter().filter_map(|t| non_blank(Some(t.as_str()))).collect(),
            participant_rules: ParticipantRules {
                min_team_size: rules.min_team_size,
                max_team_size: rules.max_team_size,
                max_participants,
                registration_fee,
                eligibility_criteria: non_blank(rules.eligibility_criteria.as_deref())
                    .unwrap_or_else(|| DEFAULT_ELIGIBILITY.to_string()),
            },
            event_logistics: input.event_logistics.unwrap_or_default(),
            prizes_and_rewards: input.prizes_and_rewards.unwrap_or_default(),
            sponsors_and_partners: input.sponsors_and_partners,
            participants: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_event(&event).await?;
        info!("Event {} created by {}", event.id, creator_id);
        Ok(event)
    }

    pub async fn list_events(&self) -> AppResult<Vec<Event>> {
        Ok(self.store.list_events().await?)
    }

    pub async fn get_event(&self, event_id: &str) -> AppResult<Event> {
        self.load_event(event_id).await
    }

    /// Registers a team for an event. Checks run in a fixed order and the
    /// first failure is reported.
    pub async fn register_team_for_event(
        &self,
        event_id: &str,
        team_id: &str,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Event> {
        let event = self.load_event(event_id).await?;
        let team = self.load_team(team_id).await?;

        if let Err(blocker) = check_event_joinable(&event, now) {
            debug!("Team {} cannot join event {}: {}", team_id, event_id, blocker);
            return Err(AppError::conflict(blocker.reason()));
        }
        if event.has_participant(team_id) {
            return Err(AppError::conflict("Team already joined this event"));
        }
        let rules = &event.participant_rules;
        let size = team.member_count();
        if !team_size_satisfies_event_rules(size, rules.min_team_size, rules.max_team_size) {
            let range = rules.team_size_range();
            return Err(AppError::conflict(format!(
                "Team size ({size}) does not meet event requirements ({range} members)"
            )));
        }

        match self.store.add_event_participant(event_id, team_id, now).await? {
            ParticipantOutcome::Added(event) => {
                info!("Team {} joined event {} (by {})", team_id, event_id, requested_by);
                Ok(event)
            }
            ParticipantOutcome::AlreadyRegistered => {
                Err(AppError::conflict("Team already joined this event"))
            }
            ParticipantOutcome::EventFull => Err(AppError::conflict("Event is full")),
            ParticipantOutcome::EventMissing => Err(AppError::not_found("Event not found")),
        }
    }

    /// Files a pending request. A full team still accepts requests; capacity
    /// is enforced when the creator approves.
    pub async fn submit_join_request(
        &self,
        team_id: &str,
        user_id: &str,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<JoinRequest> {
        let team = self.load_team(team_id).await?;
        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }
        if is_team_member(&team, user_id) {
            return Err(AppError::conflict("You are already a member of this team"));
        }

        let request = JoinRequest {
            id: new_id(),
            team_id: team.id.clone(),
            user_id: user_id.to_string(),
            status: JoinRequestStatus::Pending,
            message: non_blank(message.as_deref()).unwrap_or_default(),
            requested_at: now,
            responded_at: None,
            responded_by: None,
        };
        // The store's uniqueness rule is the guard against duplicates.
        self.store.insert_join_request(&request).await?;
        info!("User {} requested to join team {}", user_id, team_id);
        Ok(request)
    }

    /// Pending requests for a team, each with the applicant's profile.
    pub async fn team_join_requests(
        &self,
        team_id: &str,
        requester_id: &str,
    ) -> AppResult<Vec<JoinRequestView>> {
        let team = self.load_team(team_id).await?;
        require_team_creator(&team, requester_id, "view join requests")?;
        let requests = self.store.pending_requests_for_team(team_id).await?;
        let applicants = self
            .users_by_id(requests.iter().map(|r| r.user_id.clone()).collect())
            .await?;
        Ok(requests
            .iter()
            .map(|request| JoinRequestView {
                applicant: applicants.get(&request.user_id).map(ApplicantProfile::from),
                ..JoinRequestView::from(request)
            })
            .collect())
    }

    /// The caller's pending requests, each with a summary of the team.
    pub async fn user_join_requests(&self, user_id: &str) -> AppResult<Vec<JoinRequestView>> {
        let requests = self.store.pending_requests_for_user(user_id).await?;
        let mut team_ids: Vec<String> = requests.iter().map(|r| r.team_id.clone()).collect();
        team_ids.sort();
        team_ids.dedup();
        let teams: HashMap<String, Team> = self
            .store
            .find_teams(&team_ids)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Ok(requests
            .iter()
            .map(|request| JoinRequestView {
                team: teams.get(&request.team_id).map(TeamSummary::from),
                ..JoinRequestView::from(request)
            })
            .collect())
    }

    /// Approves or rejects a pending request. Terminal requests cannot be
    /// answered again.
    pub async fn respond_to_join_request(
        &self,
        request_id: &str,
        responder_id: &str,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> AppResult<JoinRequest> {
        let request = self
            .store
            .find_join_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Join request not found"))?;
        let team = self.load_team(&request.team_id).await?;
        require_team_creator(&team, responder_id, "respond to join requests")?;

        if request.status.is_terminal() {
            return Err(already_answered(request.status));
        }
        if decision == Decision::Approve
            && is_team_full(&team)
            && !is_team_member(&team, &request.user_id)
        {
            return Err(AppError::conflict("Cannot approve request: team is full"));
        }

        match self
            .store
            .resolve_join_request(request_id, decision, responder_id, now)
            .await?
        {
            ResolveOutcome::Resolved(request) => {
                info!(
                    "Join request {} {} by {}",
                    request.id,
                    request.status.as_str(),
                    responder_id
                );
                Ok(request)
            }
            ResolveOutcome::AlreadyResolved(status) => Err(already_answered(status)),
            ResolveOutcome::TeamFull => {
                Err(AppError::conflict("Cannot approve request: team is full"))
            }
            ResolveOutcome::RequestMissing => Err(AppError::not_found("Join request not found")),
            ResolveOutcome::TeamMissing => Err(AppError::not_found("Team not found")),
        }
    }

    /// Team chat history, oldest first, with each sender's profile.
    pub async fn team_messages(&self, team_id: &str, user_id: &str) -> AppResult<Vec<MessageView>> {
        let team = self.load_team(team_id).await?;
        require_chat_access(&team, user_id, "view messages")?;
        let messages = self.store.messages_for_team(team_id).await?;
        let senders = self
            .users_by_id(messages.iter().map(|m| m.sender_id.clone()).collect())
            .await?;
        Ok(messages
            .iter()
            .map(|message| MessageView {
                sender: senders.get(&message.sender_id).map(SenderProfile::from),
                ..MessageView::from(message)
            })
            .collect())
    }

    /// Stores a chat message and returns it with the team it was posted to.
    pub async fn post_message(
        &self,
        team_id: &str,
        sender_id: &str,
        input: NewMessage,
        now: DateTime<Utc>,
    ) -> AppResult<(Team, MessageView)> {
        let team = self.load_team(team_id).await?;
        require_chat_access(&team, sender_id, "post messages")?;

        let text = input.text.as_deref().map(str::trim).unwrap_or_default().to_string();
        let attachment = input.attachment.filter(|a| !a.url.trim().is_empty());
        if text.is_empty() && attachment.is_none() {
            return Err(AppError::validation(
                "Message must contain text or an attachment",
            ));
        }

        let message = Message {
            id: new_id(),
            team_id: team.id.clone(),
            sender_id: sender_id.to_string(),
            text,
            attachment,
            created_at: now,
        };
        self.store.insert_message(&message).await?;
        debug!("Message {} posted to team {}", message.id, team_id);
        let sender = self.store.find_user(sender_id).await?;
        let view = MessageView {
            sender: sender.as_ref().map(SenderProfile::from),
            ..MessageView::from(&message)
        };
        Ok((team, view))
    }
}

fn already_answered(status: JoinRequestStatus) -> AppError {
    AppError::conflict(format!("Join request has already been {}", status.as_str()))
}
