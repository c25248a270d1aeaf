//! Blocking HTTP client for the trip API.
//!
//! Mutations and refetches go over plain request/response; the push channel
//! (`sync::connection`) is only ever used to learn that something changed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::model::{
    AvailabilityBatch, AvailabilityRecord, AvailabilitySubmit, JoinRequest, MessageRecord,
    NewMessage, NewTrip, NewUser, OptionRecord, OptionsIngest, ParticipantRecord,
    PreferencesRecord, PreferencesSubmit, PreferencesSummary, TripRecord, UserRecord, VoteOutcome,
    VoteRecord, VoteSubmit,
};

#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure: refused connection, timeout, broken socket.
    Http(String),
    /// The server answered with a non-success status.
    Status { code: u16, message: String },
    /// The body did not decode as the expected shape.
    Protocol(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { code: 404, .. })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(error) => write!(f, "http error: {error}"),
            ApiError::Status { code, message } if message.is_empty() => {
                write!(f, "server error: {code}")
            }
            ApiError::Status { code, message } => write!(f, "server error: {code} {message}"),
            ApiError::Protocol(error) => write!(f, "protocol error: {error}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// One trip server, addressed by its base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The matching push-channel URL (`http` → `ws`, `https` → `wss`).
    pub fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{base}/ws")
    }

    pub fn health(&self) -> Result<Value, ApiError> {
        self.get_json("/api/health")
    }

    // -- users --------------------------------------------------------------

    pub fn list_users(&self) -> Result<Vec<UserRecord>, ApiError> {
        self.get_json("/api/users")
    }

    pub fn create_user(&self, new: &NewUser) -> Result<UserRecord, ApiError> {
        self.post_json("/api/users", new)
    }

    // -- trips --------------------------------------------------------------

    pub fn list_trips(&self) -> Result<Vec<TripRecord>, ApiError> {
        self.get_json("/api/trips")
    }

    pub fn create_trip(&self, new: &NewTrip) -> Result<TripRecord, ApiError> {
        self.post_json("/api/trips", new)
    }

    pub fn get_trip(&self, trip_id: &str) -> Result<TripRecord, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}"))
    }

    pub fn join_trip(&self, join: &JoinRequest) -> Result<ParticipantRecord, ApiError> {
        self.post_json("/api/trips/join", join)
    }

    pub fn list_participants(&self, trip_id: &str) -> Result<Vec<ParticipantRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/participants"))
    }

    // -- messages -----------------------------------------------------------

    pub fn list_messages(&self, trip_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/messages"))
    }

    pub fn post_message(&self, trip_id: &str, new: &NewMessage) -> Result<MessageRecord, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/messages"), new)
    }

    pub fn delete_message(&self, trip_id: &str, message_id: i64) -> Result<(), ApiError> {
        self.delete_path(&format!("/api/trips/{trip_id}/messages/{message_id}"))
    }

    // -- votes --------------------------------------------------------------

    pub fn list_votes(&self, trip_id: &str) -> Result<Vec<VoteRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/votes"))
    }

    pub fn post_vote(&self, trip_id: &str, vote: &VoteSubmit) -> Result<VoteOutcome, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/votes"), vote)
    }

    // -- options ------------------------------------------------------------

    pub fn list_options(&self, trip_id: &str) -> Result<Vec<OptionRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/options"))
    }

    pub fn ingest_options(
        &self,
        trip_id: &str,
        ingest: &OptionsIngest,
    ) -> Result<Vec<OptionRecord>, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/options"), ingest)
    }

    // -- availability -------------------------------------------------------

    pub fn list_availability(&self, trip_id: &str) -> Result<Vec<AvailabilityRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/availability"))
    }

    pub fn post_availability(
        &self,
        trip_id: &str,
        submit: &AvailabilitySubmit,
    ) -> Result<AvailabilityRecord, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/availability"), submit)
    }

    pub fn post_availability_batch(
        &self,
        trip_id: &str,
        batch: &AvailabilityBatch,
    ) -> Result<Vec<AvailabilityRecord>, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/availability/batch"), batch)
    }

    // -- preferences --------------------------------------------------------

    pub fn list_preferences(&self, trip_id: &str) -> Result<Vec<PreferencesRecord>, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/preferences"))
    }

    pub fn post_preferences(
        &self,
        trip_id: &str,
        submit: &PreferencesSubmit,
    ) -> Result<PreferencesRecord, ApiError> {
        self.post_json(&format!("/api/trips/{trip_id}/preferences"), submit)
    }

    pub fn missing_preferences(&self, trip_id: &str) -> Result<PreferencesSummary, ApiError> {
        self.get_json(&format!("/api/trips/{trip_id}/preferences/missing"))
    }

    // -- plumbing -----------------------------------------------------------

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = match ureq::get(&url).call() {
            Ok(response) => response,
            Err(error) => return Err(request_error(error)),
        };
        response
            .into_json()
            .map_err(|error| ApiError::Protocol(format!("decode {path}: {error}")))
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let payload = serde_json::to_value(body)
            .map_err(|error| ApiError::Protocol(format!("serialize {path}: {error}")))?;
        let response = match ureq::post(&url).send_json(payload) {
            Ok(response) => response,
            Err(error) => return Err(request_error(error)),
        };
        response
            .into_json()
            .map_err(|error| ApiError::Protocol(format!("decode {path}: {error}")))
    }

    fn delete_path(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.base_url);
        match ureq::delete(&url).call() {
            Ok(_) => Ok(()),
            Err(error) => Err(request_error(error)),
        }
    }
}

fn request_error(error: ureq::Error) -> ApiError {
    match error {
        ureq::Error::Status(code, response) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string())
                })
                .unwrap_or_default();
            ApiError::Status { code, message }
        }
        other => ApiError::Http(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_schemes() {
        assert_eq!(
            ApiClient::new("http://127.0.0.1:3000/").ws_url(),
            "ws://127.0.0.1:3000/ws"
        );
        assert_eq!(
            ApiClient::new("https://trips.example.com").ws_url(),
            "wss://trips.example.com/ws"
        );
    }
}
