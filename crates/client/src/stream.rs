//! Bounded, finite reads of a subject's history.

use tracing::{debug, info};

use genesisdb_core::{ClientResult, EventId, Subject};
use genesisdb_events::{Admission, Cursor, CursorTracker, Event};

use crate::client::GenesisClient;
use crate::ndjson::{Frame, parse_frame, split_lines};
use crate::status::{Operation, error_from_response, transport_error};
use crate::wire::ReadRequest;

/// The finite, ordered result of [`GenesisClient::stream`].
#[derive(Debug, Clone)]
pub struct EventBatch {
    events: Vec<Event>,
    tracker: CursorTracker,
}

impl EventBatch {
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Id of the last delivered event (range reads only).
    pub fn watermark(&self) -> Option<EventId> {
        self.tracker.watermark()
    }

    /// Cursor for a follow-up read that picks up exactly after this batch.
    pub fn resume_cursor(&self) -> Cursor {
        self.tracker.resume_cursor()
    }
}

impl IntoIterator for EventBatch {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventBatch {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Turn a complete body into admitted events, in server order.
pub(crate) fn collect_batch(body: &[u8], cursor: Cursor) -> ClientResult<EventBatch> {
    let mut tracker = CursorTracker::new(cursor);
    let mut events = Vec::new();

    for line in split_lines(body)? {
        let event = match parse_frame(&line)? {
            Frame::Event(event) => *event,
            Frame::Heartbeat => continue,
        };
        match tracker.offer(event.subject(), event.id()) {
            Admission::Deliver => events.push(event),
            verdict => debug!(id = %event.id(), ?verdict, "dropping event behind the cursor"),
        }
    }

    Ok(EventBatch { events, tracker })
}

impl GenesisClient {
    /// Read the history of `subject` and its descendants from `cursor`.
    ///
    /// The read is a snapshot: it ends at the head of the log as of the
    /// request. A malformed line fails the whole read with
    /// [`ClientError::Protocol`](genesisdb_core::ClientError::Protocol).
    pub async fn stream(&self, subject: &Subject, cursor: Cursor) -> ClientResult<EventBatch> {
        cursor.validate()?;
        info!(subject = %subject, cursor = ?cursor, "streaming events");

        let response = self
            .post_ndjson("stream")
            .json(&ReadRequest::new(subject, &cursor))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Read).await);
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let batch = collect_batch(&body, cursor)?;
        debug!(subject = %subject, events = batch.len(), "stream finished");
        Ok(batch)
    }
}
