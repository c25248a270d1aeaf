//! Shared wire model for trips, participants, and the push-event stream.
//!
//! ## Conventions
//! - Records serialize with snake_case field names, matching the REST API.
//! - Push events carry a `type` discriminator in snake_case; presence and
//!   control payloads use camelCase ids (`tripId`, `userId`) while embedded
//!   records keep their snake_case form.
//! - Timestamps on the wire are RFC 3339 strings; availability dates are
//!   normalized day keys (`YYYY-MM-DD`, see [`day_key`]).
//!
//! These types are shared by the server handlers, the synchronizing client,
//! and the tests, so the two sides of the wire cannot drift apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// Reserved user id meaning "read-only observer, no session".
///
/// Real user ids are positive autoincrements, so 0 can never collide. A
/// connection manager given this id never opens a channel.
pub const OBSERVER_USER_ID: i64 = 0;

// ---------------------------------------------------------------------------
// Trip lifecycle
// ---------------------------------------------------------------------------

/// Trip lifecycle states, in strict forward order.
///
/// Transitions are decided server-side; clients only render the reported
/// state. Unrecognized strings parse as [`TripState::Unknown`] so a newer
/// server vocabulary never breaks an older client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripState {
    Init,
    CollectingPrefs,
    CollectingDates,
    GeneratingHighOptions,
    VotingHighLevel,
    DetailedPlanReady,
    GeneratingDetailOptions,
    HotelsFlightsReady,
    Booked,
    Unknown(String),
}

/// The nine known states in lifecycle order.
pub const STATE_SEQUENCE: [TripState; 9] = [
    TripState::Init,
    TripState::CollectingPrefs,
    TripState::CollectingDates,
    TripState::GeneratingHighOptions,
    TripState::VotingHighLevel,
    TripState::DetailedPlanReady,
    TripState::GeneratingDetailOptions,
    TripState::HotelsFlightsReady,
    TripState::Booked,
];

impl TripState {
    /// Parse a wire state string. Never fails; unknown values are preserved
    /// verbatim in [`TripState::Unknown`].
    pub fn parse(s: &str) -> TripState {
        match s {
            "INIT" => TripState::Init,
            "COLLECTING_PREFS" => TripState::CollectingPrefs,
            "COLLECTING_DATES" => TripState::CollectingDates,
            "GENERATING_HIGH_OPTIONS" => TripState::GeneratingHighOptions,
            "VOTING_HIGH_LEVEL" => TripState::VotingHighLevel,
            "DETAILED_PLAN_READY" => TripState::DetailedPlanReady,
            "GENERATING_DETAIL_OPTIONS" => TripState::GeneratingDetailOptions,
            "HOTELS_FLIGHTS_READY" => TripState::HotelsFlightsReady,
            "BOOKED" => TripState::Booked,
            other => TripState::Unknown(other.to_string()),
        }
    }

    /// The wire string for this state.
    pub fn as_str(&self) -> &str {
        match self {
            TripState::Init => "INIT",
            TripState::CollectingPrefs => "COLLECTING_PREFS",
            TripState::CollectingDates => "COLLECTING_DATES",
            TripState::GeneratingHighOptions => "GENERATING_HIGH_OPTIONS",
            TripState::VotingHighLevel => "VOTING_HIGH_LEVEL",
            TripState::DetailedPlanReady => "DETAILED_PLAN_READY",
            TripState::GeneratingDetailOptions => "GENERATING_DETAIL_OPTIONS",
            TripState::HotelsFlightsReady => "HOTELS_FLIGHTS_READY",
            TripState::Booked => "BOOKED",
            TripState::Unknown(raw) => raw,
        }
    }

    /// Human-readable label. Unknown states render their raw string.
    pub fn label(&self) -> &str {
        match self {
            TripState::Init => "Getting started",
            TripState::CollectingPrefs => "Collecting preferences",
            TripState::CollectingDates => "Collecting dates",
            TripState::GeneratingHighOptions => "Generating itinerary options",
            TripState::VotingHighLevel => "Voting on itineraries",
            TripState::DetailedPlanReady => "Detailed plan ready",
            TripState::GeneratingDetailOptions => "Finding hotels & flights",
            TripState::HotelsFlightsReady => "Hotels & flights ready",
            TripState::Booked => "Booked",
            TripState::Unknown(raw) => raw,
        }
    }

    /// Position in [`STATE_SEQUENCE`], or `None` for unknown states.
    pub fn index(&self) -> Option<usize> {
        STATE_SEQUENCE.iter().position(|s| s == self)
    }

    /// True when moving from `self` to `next` is forward progress (or a
    /// no-op). Unknown states are never advanced over.
    pub fn allows_advance_to(&self, next: &TripState) -> bool {
        match (self.index(), next.index()) {
            (Some(cur), Some(nxt)) => nxt >= cur,
            _ => false,
        }
    }
}

impl std::fmt::Display for TripState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records (REST wire shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub color: Option<String>,
    pub home_city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: i64,
    pub trip_id: String,
    pub title: String,
    pub destination: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<i64>,
    pub state: String,
    pub invite_token: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: i64,
    pub trip_id: String,
    pub user_id: i64,
    pub role: String,
    pub is_online: bool,
    pub joined_at: String,
    pub has_submitted_preferences: bool,
    pub has_submitted_availability: bool,
    /// Embedded user row, resolved by the participants endpoint.
    #[serde(default)]
    pub user: Option<UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub trip_id: String,
    /// `None` for agent and system messages.
    pub user_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Structured payload whose shape depends on `kind` (calendar hints,
    /// trip-options bundles, detailed plans).
    #[serde(default)]
    pub metadata: Option<Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub id: i64,
    pub trip_id: String,
    pub option_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub image: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: i64,
    pub trip_id: String,
    pub user_id: i64,
    pub option_id: String,
    pub emoji: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: i64,
    pub trip_id: String,
    pub user_id: i64,
    /// Normalized day key, `YYYY-MM-DD`.
    pub date: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencesRecord {
    pub id: i64,
    pub trip_id: String,
    pub user_id: i64,
    pub budget_preference: Option<String>,
    pub accommodation_type: Option<String>,
    pub travel_style: Option<String>,
    pub activities: Option<Vec<String>>,
    pub dietary_restrictions: Option<String>,
    pub special_requirements: Option<String>,
    /// Free-text submissions, newest last.
    pub raw_preferences: Option<Vec<String>>,
    pub created_at: String,
}

/// Who has and hasn't submitted preferences for a trip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreferencesSummary {
    pub submitted: Vec<i64>,
    pub missing: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub home_city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrip {
    pub trip_id: String,
    pub title: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub budget: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    /// When set, this user joins the new trip as its organizer.
    #[serde(default)]
    pub creator_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub invite_token: String,
    pub user_id: i64,
}

fn default_message_kind() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSubmit {
    pub user_id: i64,
    pub option_id: String,
    pub emoji: String,
}

/// Result of a vote toggle: the affected record plus whether it was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub removed: bool,
    pub vote: VoteRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySubmit {
    pub user_id: i64,
    /// Day key or RFC 3339 timestamp; normalized via [`day_key`].
    pub date: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayEntry {
    pub date: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityBatch {
    pub user_id: i64,
    pub dates: Vec<DayEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesSubmit {
    pub user_id: i64,
    #[serde(default)]
    pub budget_preference: Option<String>,
    #[serde(default)]
    pub accommodation_type: Option<String>,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub activities: Option<Vec<String>>,
    #[serde(default)]
    pub dietary_restrictions: Option<String>,
    #[serde(default)]
    pub special_requirements: Option<String>,
    /// Free-text form of the submission, appended to `raw_preferences`.
    #[serde(default)]
    pub raw_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionUpsert {
    pub option_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Published by the external planning collaborator once options exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsIngest {
    pub options: Vec<OptionUpsert>,
    /// Body of the agent message announcing the options.
    #[serde(default)]
    pub content: Option<String>,
    /// Target lifecycle state; defaults to `VOTING_HIGH_LEVEL`. Never moves
    /// the trip backwards.
    #[serde(default)]
    pub state: Option<String>,
}

// ---------------------------------------------------------------------------
// Push events (server → client)
// ---------------------------------------------------------------------------

/// Every event kind the server broadcasts over a trip's push channel.
///
/// Deserialization of unknown kinds is handled by [`ServerEvent::parse`],
/// which maps them to [`ServerEvent::Unknown`] instead of failing, so the
/// server vocabulary can grow ahead of deployed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: i64, timestamp: String },
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: i64, timestamp: String },
    #[serde(rename_all = "camelCase")]
    Typing { user_id: i64, timestamp: String },
    NewMessage {
        #[serde(default)]
        message: Option<MessageRecord>,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: i64, timestamp: String },
    VoteUpdate {
        vote: VoteRecord,
        removed: bool,
        timestamp: String,
    },
    AvailabilityUpdate {
        availability: AvailabilityRecord,
        timestamp: String,
    },
    AvailabilityBatchUpdate {
        availability: Vec<AvailabilityRecord>,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    PreferencesUpdate { user_id: i64, timestamp: String },
    OptionsGenerated { count: usize, timestamp: String },
    /// Sent in place of events dropped by a lagging broadcast subscriber.
    EventsMissed { missed: u64 },
    /// A kind this client build does not know. Never serialized.
    #[serde(skip)]
    Unknown { kind: String },
}

/// Wire tags of every event kind this build understands.
pub const KNOWN_EVENT_KINDS: &[&str] = &[
    "user_joined",
    "user_left",
    "typing",
    "new_message",
    "message_deleted",
    "vote_update",
    "availability_update",
    "availability_batch_update",
    "preferences_update",
    "options_generated",
    "events_missed",
];

impl ServerEvent {
    /// The wire tag for this event.
    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::VoteUpdate { .. } => "vote_update",
            ServerEvent::AvailabilityUpdate { .. } => "availability_update",
            ServerEvent::AvailabilityBatchUpdate { .. } => "availability_batch_update",
            ServerEvent::PreferencesUpdate { .. } => "preferences_update",
            ServerEvent::OptionsGenerated { .. } => "options_generated",
            ServerEvent::EventsMissed { .. } => "events_missed",
            ServerEvent::Unknown { kind } => kind,
        }
    }

    /// Parse one inbound frame.
    ///
    /// Malformed JSON and known-but-misshapen payloads are errors (the
    /// caller logs and drops them); an unknown `type` is not an error.
    pub fn parse(text: &str) -> Result<ServerEvent, EventParseError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(k) => k.to_string(),
            None => return Err(EventParseError::MissingKind),
        };
        if !KNOWN_EVENT_KINDS.contains(&kind.as_str()) {
            return Ok(ServerEvent::Unknown { kind });
        }
        serde_json::from_value(value).map_err(|error| EventParseError::Malformed { kind, error })
    }
}

#[derive(Debug)]
pub enum EventParseError {
    Json(serde_json::Error),
    MissingKind,
    Malformed { kind: String, error: serde_json::Error },
}

impl std::fmt::Display for EventParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventParseError::Json(error) => write!(f, "invalid event json: {error}"),
            EventParseError::MissingKind => write!(f, "event has no type field"),
            EventParseError::Malformed { kind, error } => {
                write!(f, "malformed {kind} event: {error}")
            }
        }
    }
}

impl std::error::Error for EventParseError {}

impl From<serde_json::Error> for EventParseError {
    fn from(error: serde_json::Error) -> Self {
        EventParseError::Json(error)
    }
}

// ---------------------------------------------------------------------------
// Control messages (client → server)
// ---------------------------------------------------------------------------

/// Client-to-server control messages on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    #[serde(rename_all = "camelCase")]
    JoinTrip { trip_id: String, user_id: i64 },
    #[serde(rename_all = "camelCase")]
    LeaveTrip { trip_id: String, user_id: i64 },
    #[serde(rename_all = "camelCase")]
    Typing { trip_id: String, user_id: i64 },
}

// ---------------------------------------------------------------------------
// Day keys
// ---------------------------------------------------------------------------

const DAY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Normalize a date input to its calendar day.
///
/// Bare `YYYY-MM-DD` strings are taken literally. RFC 3339 timestamps are
/// converted to UTC first, then truncated to the UTC calendar day, so
/// `2024-10-20T23:00:00-05:00` and `2024-10-21T01:00:00+01:00` both resolve
/// to 2024-10-21. Client and server share this function, so the two sides
/// agree on day boundaries.
pub fn day_key(input: &str) -> Result<Date, DateError> {
    if let Ok(date) = Date::parse(input, DAY_FORMAT) {
        return Ok(date);
    }
    let ts = OffsetDateTime::parse(input, &Rfc3339)
        .map_err(|_| DateError::Unparseable(input.to_string()))?;
    Ok(ts.to_offset(UtcOffset::UTC).date())
}

/// Format a day key for the wire.
pub fn format_day(date: Date) -> String {
    date.format(DAY_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Current wall-clock time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    Unparseable(String),
}

impl std::fmt::Display for DateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateError::Unparseable(input) => {
                write!(f, "not a day key or RFC 3339 timestamp: {input}")
            }
        }
    }
}

impl std::error::Error for DateError {}
