//! Atomic, precondition-guarded appends.

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use genesisdb_core::{ClientError, ClientResult, EventId, Precondition};
use genesisdb_events::{Event, NewEvent};

use crate::client::GenesisClient;
use crate::ndjson::split_lines;
use crate::status::{Operation, error_from_response, transport_error};
use crate::wire::CommitRequest;

/// Outcome of a successful commit.
///
/// Holds the committed envelopes when the server echoes them back (as a JSON
/// array, an `{"events": [...]}` object, or NDJSON). A server that answers with
/// an empty body yields an empty receipt; the commit still succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    events: Vec<Event>,
}

impl CommitReceipt {
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first_id(&self) -> Option<EventId> {
        self.events.first().map(Event::id)
    }

    /// Id assigned to the last event of the batch.
    pub fn last_id(&self) -> Option<EventId> {
        self.events.last().map(Event::id)
    }

    /// Decode a commit response body.
    ///
    /// Bodies without event metadata (empty, plain text, an object with neither
    /// `events` nor `id`) yield an empty receipt. Bodies that do echo envelopes
    /// must echo valid ones.
    pub(crate) fn from_body(body: &str) -> ClientResult<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let events = match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(JsonValue::Array(items)) => decode_all(items)?,
            Ok(JsonValue::Object(mut obj)) => match obj.remove("events") {
                Some(JsonValue::Array(items)) => decode_all(items)?,
                Some(other) => {
                    return Err(ClientError::protocol(format!(
                        "commit response 'events' is not an array: {other}"
                    )));
                }
                None if obj.contains_key("id") => vec![Event::from_value(JsonValue::Object(obj))?],
                None => return Ok(Self::no_metadata()),
            },
            Ok(_) => return Ok(Self::no_metadata()),
            Err(_) if trimmed.starts_with('{') => split_lines(trimmed.as_bytes())?
                .iter()
                .map(|l| Event::from_json(l))
                .collect::<ClientResult<Vec<_>>>()?,
            Err(_) => return Ok(Self::no_metadata()),
        };
        Ok(Self { events })
    }

    fn no_metadata() -> Self {
        debug!("commit response carried no event metadata");
        Self::default()
    }
}

fn decode_all(items: Vec<JsonValue>) -> ClientResult<Vec<Event>> {
    items.into_iter().map(Event::from_value).collect()
}

/// Local checks run before anything is sent.
fn validate_batch(events: &[NewEvent], preconditions: &[Precondition]) -> ClientResult<()> {
    if events.is_empty() {
        return Err(ClientError::validation("commit requires at least one event"));
    }
    for (idx, event) in events.iter().enumerate() {
        event
            .validate()
            .map_err(|e| ClientError::validation(format!("event {idx}: {e}")))?;
    }
    for (idx, precondition) in preconditions.iter().enumerate() {
        precondition
            .validate()
            .map_err(|e| ClientError::validation(format!("precondition {idx}: {e}")))?;
    }
    Ok(())
}

impl GenesisClient {
    /// Append `events` atomically, in order, guarded by `preconditions`.
    ///
    /// Either every precondition holds and the whole batch is appended
    /// contiguously, or nothing is appended.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Validation`]: empty batch or invalid envelope/precondition
    ///   (nothing sent)
    /// - [`ClientError::PreconditionFailed`]: a precondition did not hold
    /// - [`ClientError::Conflict`]: concurrent state change outside preconditions
    /// - [`ClientError::Transport`]: the outcome is unknown. The commit is not
    ///   retried; guard retries with an idempotency precondition such as
    ///   `isQueryResultTrue` over a correlating event.
    /// - [`ClientError::Protocol`]: the server accepted the batch, so it **was**
    ///   applied, but echoed back envelopes that could not be decoded. Do not
    ///   resubmit; read the subject to recover the assigned ids.
    ///
    /// Once the server has answered with a success status the batch is applied.
    /// If the response body then cannot be read, the receipt is empty rather
    /// than reporting the outcome as unknown.
    pub async fn commit(
        &self,
        events: &[NewEvent],
        preconditions: &[Precondition],
    ) -> ClientResult<CommitReceipt> {
        validate_batch(events, preconditions)?;

        info!(
            events = events.len(),
            preconditions = preconditions.len(),
            "committing events"
        );

        let request = CommitRequest {
            events,
            preconditions,
        };
        let response = self
            .post("commit")
            .timeout(self.config().request_timeout())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Commit(preconditions)).await);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "commit accepted but response body was unreadable");
                String::new()
            }
        };
        let receipt = CommitReceipt::from_body(&body)?;
        debug!(
            committed = receipt.len(),
            last_id = ?receipt.last_id(),
            "commit accepted"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesisdb_core::Subject;
    use serde_json::json;

    const A: &str = r#"{"id":"00000000-0000-0000-0000-000000000001","source":"s","subject":"/a","type":"t","time":"2025-01-01T10:00:00Z","data":{}}"#;
    const B: &str = r#"{"id":"00000000-0000-0000-0000-000000000002","source":"s","subject":"/a","type":"t","time":"2025-01-01T10:00:01Z","data":{}}"#;

    #[test]
    fn empty_batch_is_rejected_locally() {
        let err = validate_batch(&[], &[]).unwrap_err();
        assert_eq!(err, ClientError::validation("commit requires at least one event"));
    }

    #[test]
    fn invalid_precondition_is_rejected_locally() {
        let event = NewEvent::new("s", Subject::new("/a").unwrap(), "t", &json!({})).unwrap();
        let err = validate_batch(&[event], &[Precondition::query_is_true("")]).unwrap_err();
        assert!(matches!(err, ClientError::Validation(msg) if msg.starts_with("precondition 0")));
    }

    #[test]
    fn receipt_decodes_json_array_and_ndjson() {
        let array = CommitReceipt::from_body(&format!("[{A},{B}]")).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.last_id().unwrap().to_string(), "00000000-0000-0000-0000-000000000002");

        let ndjson = CommitReceipt::from_body(&format!("{A}\n{B}\n")).unwrap();
        assert_eq!(ndjson, array);

        let wrapped = CommitReceipt::from_body(&format!("{{\"events\":[{A}]}}")).unwrap();
        assert_eq!(wrapped.first_id(), array.first_id());

        let single = CommitReceipt::from_body(A).unwrap();
        assert_eq!(single.first_id(), array.first_id());
    }

    #[test]
    fn receipt_without_metadata_is_empty() {
        assert!(CommitReceipt::from_body("").unwrap().is_empty());
        assert!(CommitReceipt::from_body("OK").unwrap().is_empty());
        assert!(CommitReceipt::from_body("{\"status\":\"ok\"}").unwrap().is_empty());
        assert!(CommitReceipt::from_body("true").unwrap().is_empty());
        assert_eq!(CommitReceipt::from_body("  ").unwrap().last_id(), None);
    }

    #[test]
    fn echoed_envelope_missing_time_is_a_protocol_error() {
        let no_time = r#"{"id":"00000000-0000-0000-0000-000000000002","source":"s","subject":"/a","type":"t","data":{}}"#;

        let err = CommitReceipt::from_body(&format!("[{A},{no_time}]")).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");

        let err = CommitReceipt::from_body(&format!("{A}\n{no_time}\n")).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");

        let err = CommitReceipt::from_body(no_time).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");

        let err = CommitReceipt::from_body(r#"{"events":"nope"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");
    }
}
