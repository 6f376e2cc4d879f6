use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use crate::eligibility::{self, EventStatus, TeamSizeRange};

pub const DEFAULT_MAX_PARTICIPANTS: u32 = 500;
pub const DEFAULT_ELIGIBILITY: &str = "Open to all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDates {
    #[serde(deserialize_with = "lenient::datetime")]
    pub registration_starts: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub registration_ends: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub event_start: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::datetime")]
    pub event_end: DateTime<Utc>,
}

/// Stored participation rules. Team size bounds stay unset when the organiser
/// left them out so the policy default applies at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRules {
    pub min_team_size: Option<u32>,
    pub max_team_size: Option<u32>,
    pub max_participants: u32,
    pub registration_fee: f64,
    pub eligibility_criteria: String,
}

impl ParticipantRules {
    pub fn team_size_range(&self) -> TeamSizeRange {
        TeamSizeRange::resolve(self.min_team_size, self.max_team_size)
    }
}

impl Default for ParticipantRules {
    fn default() -> Self {
        Self {
            min_team_size: None,
            max_team_size: None,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            registration_fee: 0.0,
            eligibility_criteria: DEFAULT_ELIGIBILITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    Online,
    #[default]
    Offline,
    Hybrid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogistics {
    #[serde(default)]
    pub event_mode: EventMode,
    pub venue_details: Option<String>,
    pub contact_information: Option<String>,
    pub resources_and_requirements: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizesAndRewards {
    pub prizes: Option<String>,
    #[serde(default)]
    pub certificates: bool,
    pub other_rewards: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsor {
    pub name: String,
    pub logo_url: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub dates: EventDates,
    #[serde(default)]
    pub location: String,
    pub created_by: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub participant_rules: ParticipantRules,
    #[serde(default)]
    pub event_logistics: EventLogistics,
    #[serde(default)]
    pub prizes_and_rewards: PrizesAndRewards,
    #[serde(default)]
    pub sponsors_and_partners: Vec<Sponsor>,
    /// Registered team ids.
    #[serde(default)]
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn participants_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_participant(&self, team_id: &str) -> bool {
        self.participants.iter().any(|p| p == team_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipantRules {
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub min_team_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_team_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_participants: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub registration_fee: Option<f64>,
    pub eligibility_criteria: Option<String>,
}

/// Input for creating an event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub dates: Option<EventDates>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub participant_rules: Option<NewParticipantRules>,
    pub event_logistics: Option<EventLogistics>,
    pub prizes_and_rewards: Option<PrizesAndRewards>,
    #[serde(default)]
    pub sponsors_and_partners: Vec<Sponsor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRulesView {
    pub min_team_size: u32,
    pub max_team_size: u32,
    pub max_participants: u32,
    pub registration_fee: f64,
    pub eligibility_criteria: String,
}

/// Event with every derived field computed against a fixed instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub dates: EventDates,
    pub location: String,
    pub created_by: String,
    pub category: String,
    pub tags: Vec<String>,
    pub participant_rules: ParticipantRulesView,
    pub event_logistics: EventLogistics,
    pub prizes_and_rewards: PrizesAndRewards,
    pub sponsors_and_partners: Vec<Sponsor>,
    pub participants: Vec<String>,
    pub participants_count: usize,
    pub status: EventStatus,
    pub is_full: bool,
    pub is_registration_open: bool,
    pub is_ongoing: bool,
    pub is_finished: bool,
    /// All join conditions hold at the moment of rendering.
    pub is_joinable: bool,
    pub created_at: DateTime<Utc>,
}

impl EventView {
    pub fn at(event: &Event, now: DateTime<Utc>) -> Self {
        let rules = &event.participant_rules;
        let range = rules.team_size_range();
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            dates: event.dates,
            location: event.location.clone(),
            created_by: event.created_by.clone(),
            category: event.category.clone(),
            tags: event.tags.clone(),
            participant_rules: ParticipantRulesView {
                min_team_size: range.min,
                max_team_size: range.max,
                max_participants: rules.max_participants,
                registration_fee: rules.registration_fee,
                eligibility_criteria: rules.eligibility_criteria.clone(),
            },
            event_logistics: event.event_logistics.clone(),
            prizes_and_rewards: event.prizes_and_rewards.clone(),
            sponsors_and_partners: event.sponsors_and_partners.clone(),
            participants: event.participants.clone(),
            participants_count: event.participants_count(),
            status: eligibility::event_status(event, now),
            is_full: eligibility::is_event_full(event),
            is_registration_open: eligibility::is_registration_open(event, now),
            is_ongoing: eligibility::is_ongoing(event, now),
            is_finished: eligibility::is_finished(event, now),
            is_joinable: eligibility::is_event_joinable(event, now),
            created_at: event.created_at,
        }
    }
}
