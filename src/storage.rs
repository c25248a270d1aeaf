//! SQLite storage layer for packtrip.
//!
//! One database shared by the HTTP handlers, the seed routine, and the CLI.
//! Rows go in and out as the wire record types from [`crate::model`], so the
//! REST layer never reshapes fields. JSON-valued columns (`metadata`,
//! `activities`, `raw_preferences`) are stored as TEXT and parsed on read.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::model::{
    AvailabilityRecord, MessageRecord, NewMessage, NewTrip, NewUser, OptionRecord, OptionUpsert,
    ParticipantRecord, PreferencesRecord, PreferencesSubmit, TripRecord, UserRecord, VoteOutcome,
    VoteRecord, VoteSubmit,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Serde(serde_json::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

fn parse_json_column(text: Option<String>) -> Result<Option<Value>, StorageError> {
    match text {
        Some(t) => Ok(Some(serde_json::from_str(&t)?)),
        None => Ok(None),
    }
}

fn parse_string_list(text: Option<String>) -> Result<Option<Vec<String>>, StorageError> {
    match text {
        Some(t) => Ok(Some(serde_json::from_str(&t)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by tests and ephemeral servers.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                username     TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                avatar       TEXT,
                color        TEXT,
                home_city    TEXT
            );

            CREATE TABLE IF NOT EXISTS trips (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id      TEXT NOT NULL UNIQUE,
                title        TEXT NOT NULL,
                destination  TEXT,
                start_date   TEXT,
                end_date     TEXT,
                budget       INTEGER,
                state        TEXT NOT NULL DEFAULT 'INIT',
                invite_token TEXT NOT NULL UNIQUE,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trip_participants (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id     TEXT NOT NULL REFERENCES trips(trip_id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                role        TEXT NOT NULL DEFAULT 'member',
                is_online   INTEGER NOT NULL DEFAULT 0,
                joined_at   TEXT NOT NULL,
                has_submitted_preferences  INTEGER NOT NULL DEFAULT 0,
                has_submitted_availability INTEGER NOT NULL DEFAULT 0,
                UNIQUE (trip_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id     TEXT NOT NULL REFERENCES trips(trip_id),
                user_id     INTEGER,
                kind        TEXT NOT NULL DEFAULT 'user',
                content     TEXT NOT NULL,
                metadata    TEXT,
                timestamp   TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_trip
                ON messages(trip_id, id);

            CREATE TABLE IF NOT EXISTS trip_options (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id     TEXT NOT NULL REFERENCES trips(trip_id),
                option_id   TEXT NOT NULL,
                kind        TEXT NOT NULL,
                title       TEXT NOT NULL,
                description TEXT,
                price       INTEGER,
                image       TEXT,
                metadata    TEXT,
                created_at  TEXT NOT NULL,
                UNIQUE (trip_id, option_id)
            );

            CREATE TABLE IF NOT EXISTS votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id     TEXT NOT NULL REFERENCES trips(trip_id),
                user_id     INTEGER NOT NULL,
                option_id   TEXT NOT NULL,
                emoji       TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                UNIQUE (trip_id, user_id, option_id, emoji)
            );

            CREATE INDEX IF NOT EXISTS idx_votes_trip
                ON votes(trip_id, option_id);

            CREATE TABLE IF NOT EXISTS date_availability (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id     TEXT NOT NULL REFERENCES trips(trip_id),
                user_id     INTEGER NOT NULL,
                date        TEXT NOT NULL,
                available   INTEGER NOT NULL DEFAULT 1,
                UNIQUE (trip_id, user_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_availability_trip
                ON date_availability(trip_id, date);

            CREATE TABLE IF NOT EXISTS user_preferences (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id              TEXT NOT NULL REFERENCES trips(trip_id),
                user_id              INTEGER NOT NULL,
                budget_preference    TEXT,
                accommodation_type   TEXT,
                travel_style         TEXT,
                activities           TEXT,
                dietary_restrictions TEXT,
                special_requirements TEXT,
                raw_preferences      TEXT,
                created_at           TEXT NOT NULL,
                UNIQUE (trip_id, user_id)
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn create_user(&self, new: &NewUser) -> Result<UserRecord, StorageError> {
        if self.get_user_by_username(&new.username)?.is_some() {
            return Err(StorageError::AlreadyExists(format!(
                "username {}",
                new.username
            )));
        }
        self.conn.execute(
            "INSERT INTO users (username, display_name, avatar, color, home_city)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.username,
                new.display_name,
                new.avatar,
                new.color,
                new.home_city,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(UserRecord {
            id,
            username: new.username.clone(),
            display_name: new.display_name.clone(),
            avatar: new.avatar.clone(),
            color: new.color.clone(),
            home_city: new.home_city.clone(),
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, display_name, avatar, color, home_city
             FROM users WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    avatar: row.get(3)?,
                    color: row.get(4)?,
                    home_city: row.get(5)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, display_name, avatar, color, home_city
             FROM users WHERE username = ?1",
        )?;
        let row = stmt
            .query_row(params![username], |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    avatar: row.get(3)?,
                    color: row.get(4)?,
                    home_city: row.get(5)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, display_name, avatar, color, home_city
             FROM users ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                avatar: row.get(3)?,
                color: row.get(4)?,
                home_city: row.get(5)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Trips
    // -----------------------------------------------------------------------

    pub fn create_trip(
        &self,
        new: &NewTrip,
        invite_token: &str,
        now: &str,
    ) -> Result<TripRecord, StorageError> {
        if self.get_trip(&new.trip_id)?.is_some() {
            return Err(StorageError::AlreadyExists(format!("trip {}", new.trip_id)));
        }
        let state = new.state.as_deref().unwrap_or("INIT");
        self.conn.execute(
            "INSERT INTO trips
             (trip_id, title, destination, start_date, end_date, budget,
              state, invite_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.trip_id,
                new.title,
                new.destination,
                new.start_date,
                new.end_date,
                new.budget,
                state,
                invite_token,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(TripRecord {
            id,
            trip_id: new.trip_id.clone(),
            title: new.title.clone(),
            destination: new.destination.clone(),
            start_date: new.start_date.clone(),
            end_date: new.end_date.clone(),
            budget: new.budget,
            state: state.to_string(),
            invite_token: invite_token.to_string(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })
    }

    pub fn get_trip(&self, trip_id: &str) -> Result<Option<TripRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, title, destination, start_date, end_date,
                    budget, state, invite_token, created_at, updated_at
             FROM trips WHERE trip_id = ?1",
        )?;
        let row = stmt
            .query_row(params![trip_id], Self::trip_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn get_trip_by_invite(&self, token: &str) -> Result<Option<TripRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, title, destination, start_date, end_date,
                    budget, state, invite_token, created_at, updated_at
             FROM trips WHERE invite_token = ?1",
        )?;
        let row = stmt
            .query_row(params![token], Self::trip_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn list_trips(&self) -> Result<Vec<TripRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, title, destination, start_date, end_date,
                    budget, state, invite_token, created_at, updated_at
             FROM trips ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::trip_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Set a trip's lifecycle state and bump its `updated_at`.
    pub fn set_trip_state(
        &self,
        trip_id: &str,
        state: &str,
        now: &str,
    ) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "UPDATE trips SET state = ?2, updated_at = ?3 WHERE trip_id = ?1",
            params![trip_id, state, now],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("trip {trip_id}")));
        }
        Ok(())
    }

    fn trip_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TripRecord> {
        Ok(TripRecord {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            title: row.get(2)?,
            destination: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            budget: row.get(6)?,
            state: row.get(7)?,
            invite_token: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // -----------------------------------------------------------------------
    // Participants
    // -----------------------------------------------------------------------

    /// Add a user to a trip. Joining a trip you are already in is a no-op
    /// that returns the existing membership.
    pub fn add_participant(
        &self,
        trip_id: &str,
        user_id: i64,
        role: &str,
        now: &str,
    ) -> Result<ParticipantRecord, StorageError> {
        if let Some(existing) = self.get_participant(trip_id, user_id)? {
            return Ok(existing);
        }
        self.conn.execute(
            "INSERT INTO trip_participants (trip_id, user_id, role, is_online, joined_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![trip_id, user_id, role, now],
        )?;
        match self.get_participant(trip_id, user_id)? {
            Some(p) => Ok(p),
            None => Err(StorageError::NotFound(format!(
                "participant {user_id} in trip {trip_id}"
            ))),
        }
    }

    pub fn get_participant(
        &self,
        trip_id: &str,
        user_id: i64,
    ) -> Result<Option<ParticipantRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.trip_id, p.user_id, p.role, p.is_online, p.joined_at,
                    p.has_submitted_preferences, p.has_submitted_availability,
                    u.id, u.username, u.display_name, u.avatar, u.color, u.home_city
             FROM trip_participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.trip_id = ?1 AND p.user_id = ?2",
        )?;
        let row = stmt
            .query_row(params![trip_id, user_id], Self::participant_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn list_participants(&self, trip_id: &str) -> Result<Vec<ParticipantRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.trip_id, p.user_id, p.role, p.is_online, p.joined_at,
                    p.has_submitted_preferences, p.has_submitted_availability,
                    u.id, u.username, u.display_name, u.avatar, u.color, u.home_city
             FROM trip_participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.trip_id = ?1
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![trip_id], Self::participant_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn count_participants(&self, trip_id: &str) -> Result<i64, StorageError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM trip_participants WHERE trip_id = ?1",
            params![trip_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn set_participant_online(
        &self,
        trip_id: &str,
        user_id: i64,
        online: bool,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE trip_participants SET is_online = ?3
             WHERE trip_id = ?1 AND user_id = ?2",
            params![trip_id, user_id, online as i32],
        )?;
        Ok(affected > 0)
    }

    pub fn mark_preferences_submitted(
        &self,
        trip_id: &str,
        user_id: i64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE trip_participants SET has_submitted_preferences = 1
             WHERE trip_id = ?1 AND user_id = ?2",
            params![trip_id, user_id],
        )?;
        Ok(())
    }

    pub fn mark_availability_submitted(
        &self,
        trip_id: &str,
        user_id: i64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE trip_participants SET has_submitted_availability = 1
             WHERE trip_id = ?1 AND user_id = ?2",
            params![trip_id, user_id],
        )?;
        Ok(())
    }

    fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRecord> {
        Ok(ParticipantRecord {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            user_id: row.get(2)?,
            role: row.get(3)?,
            is_online: row.get::<_, i32>(4)? != 0,
            joined_at: row.get(5)?,
            has_submitted_preferences: row.get::<_, i32>(6)? != 0,
            has_submitted_availability: row.get::<_, i32>(7)? != 0,
            user: Some(UserRecord {
                id: row.get(8)?,
                username: row.get(9)?,
                display_name: row.get(10)?,
                avatar: row.get(11)?,
                color: row.get(12)?,
                home_city: row.get(13)?,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn insert_message(
        &self,
        trip_id: &str,
        new: &NewMessage,
        timestamp: &str,
    ) -> Result<MessageRecord, StorageError> {
        let metadata_text = match &new.metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO messages (trip_id, user_id, kind, content, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                trip_id,
                new.user_id,
                new.kind,
                new.content,
                metadata_text,
                timestamp,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(MessageRecord {
            id,
            trip_id: trip_id.to_string(),
            user_id: new.user_id,
            kind: new.kind.clone(),
            content: new.content.clone(),
            metadata: new.metadata.clone(),
            timestamp: timestamp.to_string(),
        })
    }

    pub fn list_messages(&self, trip_id: &str) -> Result<Vec<MessageRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, kind, content, metadata, timestamp
             FROM messages WHERE trip_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![trip_id], |row| {
            Ok((
                MessageRecord {
                    id: row.get(0)?,
                    trip_id: row.get(1)?,
                    user_id: row.get(2)?,
                    kind: row.get(3)?,
                    content: row.get(4)?,
                    metadata: None,
                    timestamp: row.get(6)?,
                },
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (mut record, metadata) = row?;
            record.metadata = parse_json_column(metadata)?;
            result.push(record);
        }
        Ok(result)
    }

    pub fn delete_message(&self, trip_id: &str, message_id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM messages WHERE trip_id = ?1 AND id = ?2",
            params![trip_id, message_id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    /// Insert or refresh one generated option, keyed by `(trip_id, option_id)`.
    pub fn upsert_option(
        &self,
        trip_id: &str,
        option: &OptionUpsert,
        now: &str,
    ) -> Result<OptionRecord, StorageError> {
        let metadata_text = match &option.metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO trip_options
             (trip_id, option_id, kind, title, description, price, image, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (trip_id, option_id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                description = excluded.description,
                price = excluded.price,
                image = excluded.image,
                metadata = excluded.metadata",
            params![
                trip_id,
                option.option_id,
                option.kind,
                option.title,
                option.description,
                option.price,
                option.image,
                metadata_text,
                now,
            ],
        )?;
        match self.get_option(trip_id, &option.option_id)? {
            Some(record) => Ok(record),
            None => Err(StorageError::NotFound(format!(
                "option {} in trip {trip_id}",
                option.option_id
            ))),
        }
    }

    pub fn get_option(
        &self,
        trip_id: &str,
        option_id: &str,
    ) -> Result<Option<OptionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, option_id, kind, title, description, price,
                    image, metadata, created_at
             FROM trip_options WHERE trip_id = ?1 AND option_id = ?2",
        )?;
        let row = stmt
            .query_row(params![trip_id, option_id], |row| {
                Ok((
                    OptionRecord {
                        id: row.get(0)?,
                        trip_id: row.get(1)?,
                        option_id: row.get(2)?,
                        kind: row.get(3)?,
                        title: row.get(4)?,
                        description: row.get(5)?,
                        price: row.get(6)?,
                        image: row.get(7)?,
                        metadata: None,
                        created_at: row.get(9)?,
                    },
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .optional()?;
        match row {
            Some((mut record, metadata)) => {
                record.metadata = parse_json_column(metadata)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_options(&self, trip_id: &str) -> Result<Vec<OptionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, option_id, kind, title, description, price,
                    image, metadata, created_at
             FROM trip_options WHERE trip_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![trip_id], |row| {
            Ok((
                OptionRecord {
                    id: row.get(0)?,
                    trip_id: row.get(1)?,
                    option_id: row.get(2)?,
                    kind: row.get(3)?,
                    title: row.get(4)?,
                    description: row.get(5)?,
                    price: row.get(6)?,
                    image: row.get(7)?,
                    metadata: None,
                    created_at: row.get(9)?,
                },
                row.get::<_, Option<String>>(8)?,
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (mut record, metadata) = row?;
            record.metadata = parse_json_column(metadata)?;
            result.push(record);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Votes
    // -----------------------------------------------------------------------

    /// Toggle a vote on the exact `(user, option, emoji)` triple: insert it
    /// if absent, remove it if present. Voting with a different emoji on the
    /// same option never disturbs existing votes.
    pub fn toggle_vote(
        &self,
        trip_id: &str,
        vote: &VoteSubmit,
        now: &str,
    ) -> Result<VoteOutcome, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, option_id, emoji, timestamp
             FROM votes
             WHERE trip_id = ?1 AND user_id = ?2 AND option_id = ?3 AND emoji = ?4",
        )?;
        let existing = stmt
            .query_row(
                params![trip_id, vote.user_id, vote.option_id, vote.emoji],
                Self::vote_from_row,
            )
            .optional()?;

        if let Some(record) = existing {
            self.conn
                .execute("DELETE FROM votes WHERE id = ?1", params![record.id])?;
            return Ok(VoteOutcome {
                removed: true,
                vote: record,
            });
        }

        self.conn.execute(
            "INSERT INTO votes (trip_id, user_id, option_id, emoji, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![trip_id, vote.user_id, vote.option_id, vote.emoji, now],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(VoteOutcome {
            removed: false,
            vote: VoteRecord {
                id,
                trip_id: trip_id.to_string(),
                user_id: vote.user_id,
                option_id: vote.option_id.clone(),
                emoji: vote.emoji.clone(),
                timestamp: now.to_string(),
            },
        })
    }

    pub fn list_votes(&self, trip_id: &str) -> Result<Vec<VoteRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, option_id, emoji, timestamp
             FROM votes WHERE trip_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![trip_id], Self::vote_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn vote_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoteRecord> {
        Ok(VoteRecord {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            user_id: row.get(2)?,
            option_id: row.get(3)?,
            emoji: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }

    // -----------------------------------------------------------------------
    // Availability
    // -----------------------------------------------------------------------

    /// Record one user's availability for one day. Re-submitting the same
    /// `(user, day)` overwrites the flag in place; the row count for the
    /// pair never grows past one.
    pub fn upsert_availability(
        &self,
        trip_id: &str,
        user_id: i64,
        date: &str,
        available: bool,
    ) -> Result<AvailabilityRecord, StorageError> {
        self.conn.execute(
            "INSERT INTO date_availability (trip_id, user_id, date, available)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (trip_id, user_id, date) DO UPDATE SET
                available = excluded.available",
            params![trip_id, user_id, date, available as i32],
        )?;
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, date, available
             FROM date_availability
             WHERE trip_id = ?1 AND user_id = ?2 AND date = ?3",
        )?;
        let record = stmt.query_row(params![trip_id, user_id, date], Self::availability_from_row)?;
        Ok(record)
    }

    pub fn list_availability(&self, trip_id: &str) -> Result<Vec<AvailabilityRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, date, available
             FROM date_availability WHERE trip_id = ?1 ORDER BY date, user_id",
        )?;
        let rows = stmt.query_map(params![trip_id], Self::availability_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn availability_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AvailabilityRecord> {
        Ok(AvailabilityRecord {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            user_id: row.get(2)?,
            date: row.get(3)?,
            available: row.get::<_, i32>(4)? != 0,
        })
    }

    // -----------------------------------------------------------------------
    // Preferences
    // -----------------------------------------------------------------------

    /// Insert or merge one user's preferences. Structured fields overwrite
    /// only when present in the submission; free text appends to the
    /// `raw_preferences` history.
    pub fn upsert_preferences(
        &self,
        trip_id: &str,
        submit: &PreferencesSubmit,
        now: &str,
    ) -> Result<PreferencesRecord, StorageError> {
        let existing = self.get_preferences(trip_id, submit.user_id)?;
        let mut record = match existing {
            Some(record) => record,
            None => PreferencesRecord {
                id: 0,
                trip_id: trip_id.to_string(),
                user_id: submit.user_id,
                budget_preference: None,
                accommodation_type: None,
                travel_style: None,
                activities: None,
                dietary_restrictions: None,
                special_requirements: None,
                raw_preferences: None,
                created_at: now.to_string(),
            },
        };

        if let Some(v) = &submit.budget_preference {
            record.budget_preference = Some(v.clone());
        }
        if let Some(v) = &submit.accommodation_type {
            record.accommodation_type = Some(v.clone());
        }
        if let Some(v) = &submit.travel_style {
            record.travel_style = Some(v.clone());
        }
        if let Some(v) = &submit.activities {
            record.activities = Some(v.clone());
        }
        if let Some(v) = &submit.dietary_restrictions {
            record.dietary_restrictions = Some(v.clone());
        }
        if let Some(v) = &submit.special_requirements {
            record.special_requirements = Some(v.clone());
        }
        if let Some(text) = &submit.raw_text {
            record
                .raw_preferences
                .get_or_insert_with(Vec::new)
                .push(text.clone());
        }

        let activities_text = match &record.activities {
            Some(list) => Some(serde_json::to_string(list)?),
            None => None,
        };
        let raw_text = match &record.raw_preferences {
            Some(list) => Some(serde_json::to_string(list)?),
            None => None,
        };

        self.conn.execute(
            "INSERT INTO user_preferences
             (trip_id, user_id, budget_preference, accommodation_type, travel_style,
              activities, dietary_restrictions, special_requirements, raw_preferences,
              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (trip_id, user_id) DO UPDATE SET
                budget_preference = excluded.budget_preference,
                accommodation_type = excluded.accommodation_type,
                travel_style = excluded.travel_style,
                activities = excluded.activities,
                dietary_restrictions = excluded.dietary_restrictions,
                special_requirements = excluded.special_requirements,
                raw_preferences = excluded.raw_preferences",
            params![
                trip_id,
                submit.user_id,
                record.budget_preference,
                record.accommodation_type,
                record.travel_style,
                activities_text,
                record.dietary_restrictions,
                record.special_requirements,
                raw_text,
                record.created_at,
            ],
        )?;

        match self.get_preferences(trip_id, submit.user_id)? {
            Some(record) => Ok(record),
            None => Err(StorageError::NotFound(format!(
                "preferences for user {} in trip {trip_id}",
                submit.user_id
            ))),
        }
    }

    pub fn get_preferences(
        &self,
        trip_id: &str,
        user_id: i64,
    ) -> Result<Option<PreferencesRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, budget_preference, accommodation_type,
                    travel_style, activities, dietary_restrictions,
                    special_requirements, raw_preferences, created_at
             FROM user_preferences WHERE trip_id = ?1 AND user_id = ?2",
        )?;
        let row = stmt
            .query_row(params![trip_id, user_id], Self::preferences_parts_from_row)
            .optional()?;
        match row {
            Some((mut record, activities, raw)) => {
                record.activities = parse_string_list(activities)?;
                record.raw_preferences = parse_string_list(raw)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_preferences(&self, trip_id: &str) -> Result<Vec<PreferencesRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, user_id, budget_preference, accommodation_type,
                    travel_style, activities, dietary_restrictions,
                    special_requirements, raw_preferences, created_at
             FROM user_preferences WHERE trip_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![trip_id], Self::preferences_parts_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            let (mut record, activities, raw) = row?;
            record.activities = parse_string_list(activities)?;
            record.raw_preferences = parse_string_list(raw)?;
            result.push(record);
        }
        Ok(result)
    }

    #[allow(clippy::type_complexity)]
    fn preferences_parts_from_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(PreferencesRecord, Option<String>, Option<String>)> {
        Ok((
            PreferencesRecord {
                id: row.get(0)?,
                trip_id: row.get(1)?,
                user_id: row.get(2)?,
                budget_preference: row.get(3)?,
                accommodation_type: row.get(4)?,
                travel_style: row.get(5)?,
                activities: None,
                dietary_restrictions: row.get(7)?,
                special_requirements: row.get(8)?,
                raw_preferences: None,
                created_at: row.get(10)?,
            },
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(9)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
