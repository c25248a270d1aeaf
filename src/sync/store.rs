//! Client-side cache of one trip's collections.
//!
//! The store is plain owned data: the session (or a test) constructs it,
//! mutations patch it speculatively, the dispatcher marks parts of it stale,
//! and the settle step replaces whole collections from the server. Nothing
//! here is shared or locked.

use std::collections::HashSet;

use crate::model::{
    AvailabilityRecord, MessageRecord, OptionRecord, ParticipantRecord, PreferencesRecord,
    PreferencesSummary, TripRecord, VoteRecord,
};

/// The cached collections a trip session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Trip,
    Participants,
    Messages,
    Votes,
    Options,
    Availability,
    Preferences,
}

/// Every collection, in refetch order.
pub const ALL_COLLECTIONS: [Collection; 7] = [
    Collection::Trip,
    Collection::Participants,
    Collection::Messages,
    Collection::Votes,
    Collection::Options,
    Collection::Availability,
    Collection::Preferences,
];

/// A clone of one collection as it stood when a mutation began. Restoring
/// it puts the collection back byte-for-byte, so a rollback can never leave
/// partial optimistic state behind.
#[derive(Debug, Clone)]
pub enum CollectionSnapshot {
    Messages(Vec<MessageRecord>),
    Votes(Vec<VoteRecord>),
    Availability(Vec<AvailabilityRecord>),
    Preferences(Vec<PreferencesRecord>),
}

pub struct TripStore {
    pub trip: Option<TripRecord>,
    pub participants: Vec<ParticipantRecord>,
    pub messages: Vec<MessageRecord>,
    pub options: Vec<OptionRecord>,
    pub votes: Vec<VoteRecord>,
    pub availability: Vec<AvailabilityRecord>,
    pub preferences: Vec<PreferencesRecord>,
    pub missing_preferences: PreferencesSummary,
    stale: HashSet<Collection>,
    next_provisional: i64,
}

impl TripStore {
    /// An empty store with every collection stale, so the first settle
    /// fetches the full state.
    pub fn new() -> Self {
        Self {
            trip: None,
            participants: Vec::new(),
            messages: Vec::new(),
            options: Vec::new(),
            votes: Vec::new(),
            availability: Vec::new(),
            preferences: Vec::new(),
            missing_preferences: PreferencesSummary::default(),
            stale: ALL_COLLECTIONS.iter().copied().collect(),
            next_provisional: -1,
        }
    }

    /// Next provisional id for an optimistically inserted record. Always
    /// negative; server ids are positive, so the two can never collide.
    pub fn allocate_provisional_id(&mut self) -> i64 {
        let id = self.next_provisional;
        self.next_provisional -= 1;
        id
    }

    pub fn mark_stale(&mut self, collection: Collection) {
        self.stale.insert(collection);
    }

    pub fn mark_all_stale(&mut self) {
        self.stale.extend(ALL_COLLECTIONS);
    }

    pub fn is_stale(&self, collection: Collection) -> bool {
        self.stale.contains(&collection)
    }

    pub fn has_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    /// Stale collections in [`ALL_COLLECTIONS`] order.
    pub fn stale_collections(&self) -> Vec<Collection> {
        ALL_COLLECTIONS
            .iter()
            .copied()
            .filter(|c| self.stale.contains(c))
            .collect()
    }

    /// Put a snapshot back, overwriting whatever the mutation changed.
    pub fn restore(&mut self, snapshot: CollectionSnapshot) {
        match snapshot {
            CollectionSnapshot::Messages(records) => self.messages = records,
            CollectionSnapshot::Votes(records) => self.votes = records,
            CollectionSnapshot::Availability(records) => self.availability = records,
            CollectionSnapshot::Preferences(records) => self.preferences = records,
        }
    }

    // Authoritative replacements from the server. Each clears the matching
    // stale flag.

    pub fn replace_trip(&mut self, trip: TripRecord) {
        self.trip = Some(trip);
        self.stale.remove(&Collection::Trip);
    }

    pub fn replace_participants(&mut self, records: Vec<ParticipantRecord>) {
        self.participants = records;
        self.stale.remove(&Collection::Participants);
    }

    pub fn replace_messages(&mut self, records: Vec<MessageRecord>) {
        self.messages = records;
        self.stale.remove(&Collection::Messages);
    }

    pub fn replace_votes(&mut self, records: Vec<VoteRecord>) {
        self.votes = records;
        self.stale.remove(&Collection::Votes);
    }

    pub fn replace_options(&mut self, records: Vec<OptionRecord>) {
        self.options = records;
        self.stale.remove(&Collection::Options);
    }

    pub fn replace_availability(&mut self, records: Vec<AvailabilityRecord>) {
        self.availability = records;
        self.stale.remove(&Collection::Availability);
    }

    pub fn replace_preferences(&mut self, records: Vec<PreferencesRecord>) {
        self.preferences = records;
        self.stale.remove(&Collection::Preferences);
    }

    pub fn replace_missing_preferences(&mut self, summary: PreferencesSummary) {
        self.missing_preferences = summary;
        self.stale.remove(&Collection::Preferences);
    }
}

impl Default for TripStore {
    fn default() -> Self {
        Self::new()
    }
}
