//! Event envelopes: what a writer commits and what a reader receives.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use genesisdb_core::{ClientError, ClientResult, EventId, Subject};

/// Per-event commit options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOptions {
    /// Store the payload by reference so it can later be erased (GDPR).
    pub store_data_as_reference: bool,
}

/// An event ready to be committed (no id or time yet).
///
/// The store assigns `id` and `time` during commit. Construction validates the
/// envelope, so a `NewEvent` that exists is always sendable:
///
/// - `source` and `type` are non-empty
/// - `subject` is a well-formed [`Subject`]
/// - `data` has already been serialized to JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEvent {
    source: String,
    subject: Subject,
    #[serde(rename = "type")]
    event_type: String,
    data: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<EventOptions>,
}

impl NewEvent {
    /// Build an event from any serializable payload.
    ///
    /// Fails with [`ClientError::Validation`] if a required field is empty or
    /// the payload cannot be serialized.
    pub fn new<D>(
        source: impl Into<String>,
        subject: Subject,
        event_type: impl Into<String>,
        data: &D,
    ) -> ClientResult<Self>
    where
        D: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data)
            .map_err(|e| ClientError::validation(format!("payload serialization failed: {e}")))?;

        let event = Self {
            source: source.into(),
            subject,
            event_type: event_type.into(),
            data,
            options: None,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn with_options(mut self, options: EventOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Mark the payload for by-reference storage so `erase_data` can remove it.
    pub fn store_data_as_reference(self) -> Self {
        self.with_options(EventOptions {
            store_data_as_reference: true,
        })
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.source.trim().is_empty() {
            return Err(ClientError::validation("event source must not be empty"));
        }
        if self.event_type.trim().is_empty() {
            return Err(ClientError::validation("event type must not be empty"));
        }
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn options(&self) -> Option<EventOptions> {
        self.options
    }
}

/// A committed event as delivered by the store (CloudEvents JSON).
///
/// Immutable: the store never mutates or reorders an accepted event. Erasure
/// replaces `data` with a tombstone but keeps `id`, `type`, `subject` and `time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    id: EventId,
    source: String,
    subject: Subject,
    #[serde(rename = "type")]
    event_type: String,
    time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datacontenttype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    specversion: Option<String>,
    data: JsonValue,
}

/// Wire form with every field optional, so absences become protocol errors
/// naming the field instead of generic serde failures.
#[derive(Debug, Deserialize)]
struct RawEvent {
    id: Option<String>,
    source: Option<String>,
    subject: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    time: Option<String>,
    datacontenttype: Option<String>,
    specversion: Option<String>,
    #[serde(default)]
    data: JsonValue,
}

fn required<T>(value: Option<T>, field: &str) -> ClientResult<T> {
    value.ok_or_else(|| {
        ClientError::protocol(format!("event is missing required field '{field}'"))
    })
}

impl Event {
    pub fn new(
        id: EventId,
        source: impl Into<String>,
        subject: Subject,
        event_type: impl Into<String>,
        time: DateTime<Utc>,
        data: JsonValue,
    ) -> Self {
        Self {
            id,
            source: source.into(),
            subject,
            event_type: event_type.into(),
            time,
            datacontenttype: Some("application/json".to_string()),
            specversion: Some("1.0".to_string()),
            data,
        }
    }

    /// Decode a delivered event from one JSON document.
    pub fn from_json(line: &str) -> ClientResult<Self> {
        let value: JsonValue = serde_json::from_str(line)
            .map_err(|e| ClientError::protocol(format!("invalid event JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Decode a delivered event from an already-parsed JSON value.
    ///
    /// Fails with [`ClientError::Protocol`] if `id`, `source`, `subject`, `type`
    /// or `time` is missing or malformed. A missing `data` decodes as `null`.
    pub fn from_value(value: JsonValue) -> ClientResult<Self> {
        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| ClientError::protocol(format!("invalid event shape: {e}")))?;

        let id = required(raw.id, "id")?
            .parse::<EventId>()
            .map_err(|e| ClientError::protocol(format!("invalid event id: {e}")))?;
        let source = required(raw.source, "source")?;
        let subject = Subject::new(required(raw.subject, "subject")?)
            .map_err(|e| ClientError::protocol(format!("invalid event subject: {e}")))?;
        let event_type = required(raw.event_type, "type")?;
        let time = DateTime::parse_from_rfc3339(&required(raw.time, "time")?)
            .map_err(|e| ClientError::protocol(format!("invalid event time: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            source,
            subject,
            event_type,
            time,
            datacontenttype: raw.datacontenttype,
            specversion: raw.specversion,
            data: raw.data,
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn datacontenttype(&self) -> Option<&str> {
        self.datacontenttype.as_deref()
    }

    pub fn into_data(self) -> JsonValue {
        self.data
    }

    /// Decode the payload into a caller-defined type.
    pub fn data_as<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            ClientError::protocol(format!(
                "payload of event {} does not match the requested type: {e}",
                self.id
            ))
        })
    }

    /// Whether the payload has been erased and replaced by a tombstone.
    ///
    /// The server's tombstone is a `null` payload, so an event that was
    /// committed with `null` data is indistinguishable from an erased one and
    /// also reports `true`. Commit an empty object instead when "no payload"
    /// must stay distinguishable from "erased".
    pub fn is_erased(&self) -> bool {
        is_tombstone(&self.data)
    }
}

/// Tombstone markers: `null`, or an object flagged `"erased": true`.
pub fn is_tombstone(data: &JsonValue) -> bool {
    match data {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.get("erased").and_then(JsonValue::as_bool) == Some(true),
        _ => false,
    }
}
