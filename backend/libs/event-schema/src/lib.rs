use chrono::{DateTime, Utc};
/// Event schemas for the topics shared by Agora services
///
/// Each message on the wire is an [`EventEnvelope`] whose `data` is one of the
/// payloads below. Payload fields are the minimal projection snapshot a
/// consumer needs and use camelCase names.
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for all events
pub const SCHEMA_VERSION: u32 = 1;

pub mod topics {
    /// Published by auth-service when an account is created.
    pub const AUTH_USER_EVENT: &str = "auth.user.event";
    /// Published by profile-service when a profile is edited.
    pub const PROFILE_USER_EVENT: &str = "profile.user.event";
}

pub mod event_types {
    pub const USER_REGISTERED: &str = "UserRegistered";
    pub const PROFILE_UPDATED: &str = "ProfileUpdated";
}

/// Base event envelope for all broker messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event ID for idempotency and tracing
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    /// Schema version for compatibility checking
    pub schema_version: u32,
    /// Source service that generated the event
    pub source: String,
    /// Correlation ID for distributed tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            source: source.into(),
            correlation_id: None,
            data,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

// ============================================================================
// AUTH SERVICE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisteredEvent {
    pub account_id: Uuid,
    pub full_name: String,
}

impl UserRegisteredEvent {
    pub fn envelope(self, source: &str) -> EventEnvelope<Self> {
        EventEnvelope::new(source, event_types::USER_REGISTERED, self)
    }
}

// ============================================================================
// PROFILE SERVICE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdatedEvent {
    pub account_id: Uuid,
    #[serde(default)]
    pub nick_name: Option<String>,
    pub full_name: String,
    /// Object-storage key of the avatar, never a URL
    #[serde(default)]
    pub profile_pic: Option<String>,
}

impl ProfileUpdatedEvent {
    pub fn envelope(self, source: &str) -> EventEnvelope<Self> {
        EventEnvelope::new(source, event_types::PROFILE_UPDATED, self)
    }
}

/// Parses either an enveloped message or a bare payload.
pub fn decode_event<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    match serde_json::from_slice::<EventEnvelope<T>>(payload) {
        Ok(envelope) => Ok(envelope.data),
        Err(_) => serde_json::from_slice::<T>(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case_field_names() {
        let account_id = Uuid::new_v4();
        let value = serde_json::to_value(UserRegisteredEvent {
            account_id,
            full_name: "Alice".into(),
        })
        .unwrap();

        assert_eq!(value["accountId"], account_id.to_string());
        assert_eq!(value["fullName"], "Alice");
    }

    #[test]
    fn decodes_enveloped_and_bare_payloads() {
        let event = ProfileUpdatedEvent {
            account_id: Uuid::new_v4(),
            nick_name: Some("ali".into()),
            full_name: "Alice".into(),
            profile_pic: None,
        };

        let enveloped = serde_json::to_vec(&event.clone().envelope("profile-service")).unwrap();
        let bare = serde_json::to_vec(&event).unwrap();

        assert_eq!(decode_event::<ProfileUpdatedEvent>(&enveloped).unwrap(), event);
        assert_eq!(decode_event::<ProfileUpdatedEvent>(&bare).unwrap(), event);
    }

    #[test]
    fn envelope_records_type_and_version() {
        let envelope = UserRegisteredEvent {
            account_id: Uuid::new_v4(),
            full_name: "Bob".into(),
        }
        .envelope("auth-service");

        assert_eq!(envelope.event_type, event_types::USER_REGISTERED);
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
        assert_eq!(envelope.source, "auth-service");
    }

    #[test]
    fn rejects_unrelated_json() {
        assert!(decode_event::<UserRegisteredEvent>(br#"{"hello":"world"}"#).is_err());
    }
}
