//! Projects the raw cached collections into one immutable view model.
//!
//! Everything a consumer renders comes from [`build_view`]: participants
//! joined with their users, messages with parsed timestamps, options with
//! vote tallies, availability grouped by day, and the lifecycle roadmap.
//! Partial data never branches to an error; collections that have not
//! loaded yet are empty.

use std::collections::BTreeMap;

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::model::TripState;
use crate::sync::store::TripStore;

/// The roadmap milestones the trip header renders, in lifecycle order.
pub const DEFAULT_MILESTONES: [TripState; 4] = [
    TripState::CollectingDates,
    TripState::VotingHighLevel,
    TripState::DetailedPlanReady,
    TripState::HotelsFlightsReady,
];

#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneView {
    pub state: TripState,
    pub label: String,
    pub completed: bool,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantView {
    pub user_id: i64,
    pub name: String,
    pub color: Option<String>,
    pub role: String,
    pub online: bool,
    pub has_submitted_preferences: bool,
    pub has_submitted_availability: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub id: i64,
    /// Resolved display name; `None` for agent and system messages.
    pub author: Option<String>,
    pub kind: String,
    pub content: String,
    /// Parsed creation time; `None` when the wire string does not parse.
    pub timestamp: Option<OffsetDateTime>,
    pub metadata: Option<Value>,
    pub mine: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmojiTally {
    pub emoji: String,
    pub count: usize,
    /// Whether the acting user holds this exact vote.
    pub mine: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionView {
    pub option_id: String,
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub image: Option<String>,
    pub tallies: Vec<EmojiTally>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayAvailability {
    /// Normalized day key.
    pub date: String,
    /// Users available on this day, ascending.
    pub available_user_ids: Vec<i64>,
    /// Every participant is available on this day.
    pub consensus: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripView {
    pub trip_id: String,
    pub title: String,
    pub destination: Option<String>,
    pub budget: Option<i64>,
    pub state: TripState,
    pub state_label: String,
    pub milestones: Vec<MilestoneView>,
    pub participants: Vec<ParticipantView>,
    pub messages: Vec<MessageView>,
    pub options: Vec<OptionView>,
    pub days: Vec<DayAvailability>,
    /// How many days every participant is available.
    pub consensus_days: usize,
    pub preferences_submitted: Vec<i64>,
    pub preferences_missing: Vec<i64>,
    pub connected: bool,
    /// A refetch is pending for at least one collection.
    pub syncing: bool,
}

/// Completed/current flags for each milestone against the current state.
/// A state outside the known sequence marks nothing completed or current.
pub fn milestone_rows(current: &TripState, milestones: &[TripState]) -> Vec<MilestoneView> {
    let current_index = current.index();
    milestones
        .iter()
        .map(|state| {
            let index = state.index();
            let (completed, current) = match (index, current_index) {
                (Some(m), Some(c)) => (m < c, m == c),
                _ => (false, false),
            };
            MilestoneView {
                state: state.clone(),
                label: state.label().to_string(),
                completed,
                current,
            }
        })
        .collect()
}

pub fn build_view(store: &TripStore, connected: bool, acting_user: i64) -> TripView {
    let state = store
        .trip
        .as_ref()
        .map(|t| TripState::parse(&t.state))
        .unwrap_or(TripState::Init);

    let participants: Vec<ParticipantView> = store
        .participants
        .iter()
        .map(|p| {
            let (name, color) = match &p.user {
                Some(user) => (user.display_name.clone(), user.color.clone()),
                None => (format!("user {}", p.user_id), None),
            };
            ParticipantView {
                user_id: p.user_id,
                name,
                color,
                role: p.role.clone(),
                online: p.is_online,
                has_submitted_preferences: p.has_submitted_preferences,
                has_submitted_availability: p.has_submitted_availability,
            }
        })
        .collect();

    let name_of = |user_id: i64| -> Option<String> {
        participants
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.name.clone())
    };

    let messages = store
        .messages
        .iter()
        .map(|m| MessageView {
            id: m.id,
            author: m
                .user_id
                .map(|id| name_of(id).unwrap_or_else(|| format!("user {id}"))),
            kind: m.kind.clone(),
            content: m.content.clone(),
            timestamp: OffsetDateTime::parse(&m.timestamp, &Rfc3339).ok(),
            metadata: m.metadata.clone(),
            mine: m.user_id == Some(acting_user),
        })
        .collect();

    let options = store
        .options
        .iter()
        .map(|option| {
            let mut tallies: Vec<EmojiTally> = Vec::new();
            for vote in store.votes.iter().filter(|v| v.option_id == option.option_id) {
                match tallies.iter_mut().find(|t| t.emoji == vote.emoji) {
                    Some(tally) => {
                        tally.count += 1;
                        tally.mine = tally.mine || vote.user_id == acting_user;
                    }
                    None => tallies.push(EmojiTally {
                        emoji: vote.emoji.clone(),
                        count: 1,
                        mine: vote.user_id == acting_user,
                    }),
                }
            }
            OptionView {
                option_id: option.option_id.clone(),
                kind: option.kind.clone(),
                title: option.title.clone(),
                description: option.description.clone(),
                price: option.price,
                image: option.image.clone(),
                tallies,
            }
        })
        .collect();

    // Group availability by day. BTreeMap keeps days sorted; day keys sort
    // chronologically as strings.
    let mut by_day: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for record in store.availability.iter().filter(|r| r.available) {
        let users = by_day.entry(record.date.as_str()).or_default();
        if !users.contains(&record.user_id) {
            users.push(record.user_id);
        }
    }
    let participant_ids: Vec<i64> = participants.iter().map(|p| p.user_id).collect();
    let days: Vec<DayAvailability> = by_day
        .into_iter()
        .map(|(date, mut user_ids)| {
            user_ids.sort_unstable();
            let consensus = !participant_ids.is_empty()
                && participant_ids.iter().all(|id| user_ids.contains(id));
            DayAvailability {
                date: date.to_string(),
                available_user_ids: user_ids,
                consensus,
            }
        })
        .collect();
    let consensus_days = days.iter().filter(|d| d.consensus).count();

    TripView {
        trip_id: store
            .trip
            .as_ref()
            .map(|t| t.trip_id.clone())
            .unwrap_or_default(),
        title: store
            .trip
            .as_ref()
            .map(|t| t.title.clone())
            .unwrap_or_default(),
        destination: store.trip.as_ref().and_then(|t| t.destination.clone()),
        budget: store.trip.as_ref().and_then(|t| t.budget),
        state_label: state.label().to_string(),
        milestones: milestone_rows(&state, &DEFAULT_MILESTONES),
        state,
        participants,
        messages,
        options,
        days,
        consensus_days,
        preferences_submitted: store.missing_preferences.submitted.clone(),
        preferences_missing: store.missing_preferences.missing.clone(),
        connected,
        syncing: store.has_stale(),
    }
}
