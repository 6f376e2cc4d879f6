//! Derived status of events and teams.
//!
//! Everything here is a pure function of an entity snapshot and an explicit
//! `now`; nothing reads the wall clock.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Event, Team};

/// Team size bounds applied when an event leaves them unspecified.
pub const DEFAULT_MIN_TEAM_SIZE: u32 = 1;
pub const DEFAULT_MAX_TEAM_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    Upcoming,
    RegistrationOpen,
    RegistrationClosed,
    Ongoing,
    Finished,
}

fn within(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    now >= start && now <= end
}

pub fn is_registration_open(event: &Event, now: DateTime<Utc>) -> bool {
    within(now, event.dates.registration_starts, event.dates.registration_ends)
}

pub fn is_ongoing(event: &Event, now: DateTime<Utc>) -> bool {
    within(now, event.dates.event_start, event.dates.event_end)
}

pub fn is_finished(event: &Event, now: DateTime<Utc>) -> bool {
    now > event.dates.event_end
}

pub fn is_event_full(event: &Event) -> bool {
    event.participants_count() >= event.participant_rules.max_participants as usize
}

/// Lifecycle phase of an event. Later phases win when windows overlap.
pub fn event_status(event: &Event, now: DateTime<Utc>) -> EventStatus {
    if is_finished(event, now) {
        EventStatus::Finished
    } else if is_ongoing(event, now) {
        EventStatus::Ongoing
    } else if is_registration_open(event, now) {
        EventStatus::RegistrationOpen
    } else if now < event.dates.registration_starts {
        EventStatus::Upcoming
    } else {
        EventStatus::RegistrationClosed
    }
}

/// A single reason a team cannot currently register for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinBlocker {
    EventFull,
    RegistrationClosed,
    AlreadyStarted,
    AlreadyFinished,
}

impl JoinBlocker {
    pub const fn reason(self) -> &'static str {
        match self {
            Self::EventFull => "Event is full",
            Self::RegistrationClosed => "Registration is closed for this event",
            Self::AlreadyStarted => "Event has already started",
            Self::AlreadyFinished => "Event has already finished",
        }
    }
}

impl fmt::Display for JoinBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Every failing join condition, in the order they are checked.
pub fn join_blockers(event: &Event, now: DateTime<Utc>) -> Vec<JoinBlocker> {
    let checks = [
        (is_event_full(event), JoinBlocker::EventFull),
        (!is_registration_open(event, now), JoinBlocker::RegistrationClosed),
        (is_ongoing(event, now), JoinBlocker::AlreadyStarted),
        (is_finished(event, now), JoinBlocker::AlreadyFinished),
    ];
    checks
        .into_iter()
        .filter_map(|(failed, blocker)| failed.then_some(blocker))
        .collect()
}

/// Ok when the event accepts registrations, otherwise the first blocker.
pub fn check_event_joinable(event: &Event, now: DateTime<Utc>) -> Result<(), JoinBlocker> {
    match join_blockers(event, now).first() {
        Some(blocker) => Err(*blocker),
        None => Ok(()),
    }
}

pub fn is_event_joinable(event: &Event, now: DateTime<Utc>) -> bool {
    check_event_joinable(event, now).is_ok()
}

/// Inclusive team size bounds for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSizeRange {
    pub min: u32,
    pub max: u32,
}

impl TeamSizeRange {
    pub fn resolve(min: Option<u32>, max: Option<u32>) -> Self {
        Self {
            min: min.unwrap_or(DEFAULT_MIN_TEAM_SIZE),
            max: max.unwrap_or(DEFAULT_MAX_TEAM_SIZE),
        }
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min as usize && count <= self.max as usize
    }
}

impl fmt::Display for TeamSizeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

pub fn team_size_satisfies_event_rules(
    member_count: usize,
    min_team_size: Option<u32>,
    max_team_size: Option<u32>,
) -> bool {
    TeamSizeRange::resolve(min_team_size, max_team_size).contains(member_count)
}

pub fn is_team_full(team: &Team) -> bool {
    team.member_count() >= team.max_members as usize
}
