//! Request bodies as they travel over the wire (camelCase JSON).

use serde::Serialize;

use genesisdb_core::{EventId, Precondition, Subject};
use genesisdb_events::{Cursor, NewEvent};

#[derive(Debug, Serialize)]
pub(crate) struct CommitRequest<'a> {
    pub events: &'a [NewEvent],
    #[serde(skip_serializing_if = "no_preconditions")]
    pub preconditions: &'a [Precondition],
}

fn no_preconditions(preconditions: &&[Precondition]) -> bool {
    preconditions.is_empty()
}

/// Body of `/stream` and `/observe`.
#[derive(Debug, Serialize)]
pub(crate) struct ReadRequest<'a> {
    pub subject: &'a Subject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ReadOptions<'a>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_lower_bound_event: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_by_event_type: Option<&'a str>,
}

impl<'a> ReadRequest<'a> {
    pub fn new(subject: &'a Subject, cursor: &'a Cursor) -> Self {
        let options = match cursor {
            Cursor::Start => None,
            Cursor::After { id } | Cursor::From { id } => Some(ReadOptions {
                lower_bound: Some(*id),
                include_lower_bound_event: Some(matches!(cursor, Cursor::From { .. })),
                ..ReadOptions::default()
            }),
            Cursor::LatestByEventType { event_type } => Some(ReadOptions {
                latest_by_event_type: Some(event_type),
                ..ReadOptions::default()
            }),
        };
        Self { subject, options }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EraseRequest<'a> {
    pub subject: &'a Subject,
}
