//! Optimistic mutations over the trip store.
//!
//! Every user-initiated write runs the same five-step protocol: snapshot the
//! affected collection, apply a speculative local patch, issue the remote
//! write, restore the snapshot if the write fails, and mark the collection
//! stale so the next settle reconciles with server truth. The outcome is a
//! [`MutationReceipt`]; failures are contained in the receipt, never
//! returned as `Err`.
//!
//! Each mutation takes its own snapshot at the moment it begins. Two rapid
//! toggles therefore roll back independently: the second one's restore can
//! never clobber the first one's already-applied patch.

use crate::model::{
    day_key, format_day, now_rfc3339, AvailabilityBatch, AvailabilityRecord, AvailabilitySubmit,
    DateError, DayEntry, NewMessage, PreferencesSubmit, VoteRecord, VoteSubmit,
};
use crate::sync::api::{ApiClient, ApiError};
use crate::sync::store::{Collection, CollectionSnapshot, TripStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ToggleVote,
    SetAvailability,
    SetAvailabilityBatch,
    SendMessage,
    SubmitPreferences,
}

/// Lifecycle of one mutation: `Idle` before its snapshot is taken,
/// `Optimistic` while the remote write is in flight, then exactly one of
/// `Committed` or `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Optimistic,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub enum MutationError {
    Api(ApiError),
    Date(DateError),
}

impl std::fmt::Display for MutationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationError::Api(error) => write!(f, "{error}"),
            MutationError::Date(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for MutationError {}

impl From<ApiError> for MutationError {
    fn from(error: ApiError) -> Self {
        MutationError::Api(error)
    }
}

impl From<DateError> for MutationError {
    fn from(error: DateError) -> Self {
        MutationError::Date(error)
    }
}

/// How one mutation ended. `phase` is `Committed` or `RolledBack`;
/// `RolledBack` carries the error that caused it.
#[derive(Debug)]
pub struct MutationReceipt {
    pub kind: MutationKind,
    pub phase: MutationPhase,
    pub error: Option<MutationError>,
}

impl MutationReceipt {
    pub fn committed(&self) -> bool {
        self.phase == MutationPhase::Committed
    }

    /// A mutation rejected before any local patch was applied (bad input).
    fn rejected(kind: MutationKind, error: MutationError) -> Self {
        Self {
            kind,
            phase: MutationPhase::RolledBack,
            error: Some(error),
        }
    }
}

/// One in-flight mutation: its kind, phase, and the private snapshot its
/// rollback restores.
pub struct Mutation {
    kind: MutationKind,
    phase: MutationPhase,
    snapshot: Option<CollectionSnapshot>,
}

impl Mutation {
    /// Take the snapshot and enter the `Optimistic` phase. The speculative
    /// patch is applied by the caller right after this.
    pub fn begin(kind: MutationKind, snapshot: CollectionSnapshot) -> Self {
        Self {
            kind,
            phase: MutationPhase::Optimistic,
            snapshot: Some(snapshot),
        }
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// The remote write landed; the speculative patch stands until the
    /// settle refetch replaces it with server truth.
    pub fn commit(mut self) -> MutationReceipt {
        self.phase = MutationPhase::Committed;
        MutationReceipt {
            kind: self.kind,
            phase: self.phase,
            error: None,
        }
    }

    /// The remote write failed; put the collection back exactly as it was
    /// when this mutation began.
    pub fn roll_back(mut self, store: &mut TripStore, error: MutationError) -> MutationReceipt {
        if let Some(snapshot) = self.snapshot.take() {
            store.restore(snapshot);
        }
        self.phase = MutationPhase::RolledBack;
        crate::tlog!("mutation {:?} rolled back: {}", self.kind, error);
        MutationReceipt {
            kind: self.kind,
            phase: self.phase,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Speculative transforms (pure, so the snapshot/restore contract is
// testable without HTTP)
// ---------------------------------------------------------------------------

/// Mirror of the server's vote toggle: remove the exact
/// `(user, option, emoji)` triple if present, otherwise append a provisional
/// record. Returns true when a vote was removed.
pub fn apply_vote_toggle(
    votes: &mut Vec<VoteRecord>,
    trip_id: &str,
    vote: &VoteSubmit,
    provisional_id: i64,
    now: &str,
) -> bool {
    if let Some(pos) = votes.iter().position(|v| {
        v.user_id == vote.user_id && v.option_id == vote.option_id && v.emoji == vote.emoji
    }) {
        votes.remove(pos);
        return true;
    }
    votes.push(VoteRecord {
        id: provisional_id,
        trip_id: trip_id.to_string(),
        user_id: vote.user_id,
        option_id: vote.option_id.clone(),
        emoji: vote.emoji.clone(),
        timestamp: now.to_string(),
    });
    false
}

/// Mirror of the server's availability upsert: overwrite the flag on the
/// acting user's record for that day, or insert a provisional record.
/// `day` must already be a normalized day key.
pub fn apply_availability(
    availability: &mut Vec<AvailabilityRecord>,
    trip_id: &str,
    user_id: i64,
    day: &str,
    available: bool,
    provisional_id: i64,
) {
    if let Some(record) = availability
        .iter_mut()
        .find(|r| r.user_id == user_id && r.date == day)
    {
        record.available = available;
        return;
    }
    availability.push(AvailabilityRecord {
        id: provisional_id,
        trip_id: trip_id.to_string(),
        user_id,
        date: day.to_string(),
        available,
    });
}

// ---------------------------------------------------------------------------
// Controller entry points
// ---------------------------------------------------------------------------

pub fn toggle_vote(
    api: &ApiClient,
    store: &mut TripStore,
    trip_id: &str,
    vote: &VoteSubmit,
) -> MutationReceipt {
    let mutation = Mutation::begin(
        MutationKind::ToggleVote,
        CollectionSnapshot::Votes(store.votes.clone()),
    );
    let provisional = store.allocate_provisional_id();
    apply_vote_toggle(&mut store.votes, trip_id, vote, provisional, &now_rfc3339());

    let receipt = match api.post_vote(trip_id, vote) {
        Ok(_) => mutation.commit(),
        Err(error) => mutation.roll_back(store, error.into()),
    };
    store.mark_stale(Collection::Votes);
    receipt
}

pub fn set_availability(
    api: &ApiClient,
    store: &mut TripStore,
    trip_id: &str,
    user_id: i64,
    date: &str,
    available: bool,
) -> MutationReceipt {
    let day = match day_key(date) {
        Ok(day) => format_day(day),
        Err(error) => return MutationReceipt::rejected(MutationKind::SetAvailability, error.into()),
    };

    let mutation = Mutation::begin(
        MutationKind::SetAvailability,
        CollectionSnapshot::Availability(store.availability.clone()),
    );
    let provisional = store.allocate_provisional_id();
    apply_availability(
        &mut store.availability,
        trip_id,
        user_id,
        &day,
        available,
        provisional,
    );

    let submit = AvailabilitySubmit {
        user_id,
        date: day,
        available,
    };
    let receipt = match api.post_availability(trip_id, &submit) {
        Ok(_) => mutation.commit(),
        Err(error) => mutation.roll_back(store, error.into()),
    };
    store.mark_stale(Collection::Availability);
    receipt
}

/// Apply the single-date rule for every entry against one evolving
/// snapshot, then issue one batch request. An unparseable date anywhere
/// rejects the whole batch before any patch is applied. An empty batch is
/// legal and equivalent to doing nothing.
pub fn set_availability_batch(
    api: &ApiClient,
    store: &mut TripStore,
    trip_id: &str,
    user_id: i64,
    entries: &[DayEntry],
) -> MutationReceipt {
    let mut normalized = Vec::with_capacity(entries.len());
    for entry in entries {
        match day_key(&entry.date) {
            Ok(day) => normalized.push(DayEntry {
                date: format_day(day),
                available: entry.available,
            }),
            Err(error) => {
                return MutationReceipt::rejected(MutationKind::SetAvailabilityBatch, error.into())
            }
        }
    }

    let mutation = Mutation::begin(
        MutationKind::SetAvailabilityBatch,
        CollectionSnapshot::Availability(store.availability.clone()),
    );
    for entry in &normalized {
        let provisional = store.allocate_provisional_id();
        apply_availability(
            &mut store.availability,
            trip_id,
            user_id,
            &entry.date,
            entry.available,
            provisional,
        );
    }

    let batch = AvailabilityBatch {
        user_id,
        dates: normalized,
    };
    let receipt = match api.post_availability_batch(trip_id, &batch) {
        Ok(_) => mutation.commit(),
        Err(error) => mutation.roll_back(store, error.into()),
    };
    store.mark_stale(Collection::Availability);
    receipt
}

/// No speculative insert: the server owns message ordering, so the log is
/// only marked stale once the write lands.
pub fn send_message(
    api: &ApiClient,
    store: &mut TripStore,
    trip_id: &str,
    message: &NewMessage,
) -> MutationReceipt {
    let mutation = Mutation::begin(
        MutationKind::SendMessage,
        CollectionSnapshot::Messages(store.messages.clone()),
    );
    match api.post_message(trip_id, message) {
        Ok(_) => {
            store.mark_stale(Collection::Messages);
            mutation.commit()
        }
        Err(error) => mutation.roll_back(store, error.into()),
    }
}

/// Like [`send_message`]: no local patch, refetch on success.
pub fn submit_preferences(
    api: &ApiClient,
    store: &mut TripStore,
    trip_id: &str,
    submit: &PreferencesSubmit,
) -> MutationReceipt {
    let mutation = Mutation::begin(
        MutationKind::SubmitPreferences,
        CollectionSnapshot::Preferences(store.preferences.clone()),
    );
    match api.post_preferences(trip_id, submit) {
        Ok(_) => {
            store.mark_stale(Collection::Preferences);
            store.mark_stale(Collection::Participants);
            mutation.commit()
        }
        Err(error) => mutation.roll_back(store, error.into()),
    }
}
