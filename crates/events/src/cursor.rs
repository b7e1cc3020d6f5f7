//! Read positions: where a read starts and how far delivery has progressed.
//!
//! A [`Cursor`] is an explicit, serializable value. The client never persists
//! it; callers that need to survive restarts store `resume_cursor()` wherever
//! they keep their own state and pass it back in on the next read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use genesisdb_core::{ClientError, ClientResult, EventId, Subject};

/// Starting position of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Cursor {
    /// From the beginning of the subject's history.
    #[default]
    Start,
    /// Strictly after `id` (`include_lower_bound_event = false`).
    After { id: EventId },
    /// At and after `id` (`include_lower_bound_event = true`).
    From { id: EventId },
    /// Only the newest event of `event_type` per subject.
    LatestByEventType { event_type: String },
}

impl Cursor {
    pub fn after(id: EventId) -> Self {
        Self::After { id }
    }

    pub fn from_id(id: EventId) -> Self {
        Self::From { id }
    }

    pub fn latest_by_event_type(event_type: impl Into<String>) -> Self {
        Self::LatestByEventType {
            event_type: event_type.into(),
        }
    }

    /// `(lower_bound, include_lower_bound_event)` for range cursors.
    pub fn lower_bound(&self) -> Option<(EventId, bool)> {
        match self {
            Cursor::After { id } => Some((*id, false)),
            Cursor::From { id } => Some((*id, true)),
            Cursor::Start | Cursor::LatestByEventType { .. } => None,
        }
    }

    pub fn latest_event_type(&self) -> Option<&str> {
        match self {
            Cursor::LatestByEventType { event_type } => Some(event_type),
            _ => None,
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        match self {
            Cursor::LatestByEventType { event_type } if event_type.trim().is_empty() => Err(
                ClientError::validation("latest_by_event_type requires a non-empty event type"),
            ),
            _ => Ok(()),
        }
    }
}

/// Verdict for a delivery offered to a [`CursorTracker`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not seen before; hand it to the caller.
    Deliver,
    /// Already delivered (at or below the watermark).
    Duplicate,
    /// Latest-by-type only: a newer event for the same subject was delivered.
    Superseded,
}

#[derive(Debug, Clone)]
enum Progress {
    Range {
        watermark: Option<EventId>,
    },
    Latest {
        delivered: HashMap<Subject, EventId>,
    },
}

/// Tracks delivery progress for one read.
///
/// - **Range mode** (`Start`, `After`, `From`): a single linear watermark, the
///   id of the last recorded delivery. Resuming with
///   [`resume_cursor`](Self::resume_cursor) (`After { watermark }`) neither
///   redelivers nor skips events.
/// - **Latest-by-type mode**: no linear watermark. Progress is the newest id
///   delivered per subject, so a replayed or older "latest" for a subject is
///   rejected once a newer one has been delivered.
#[derive(Debug, Clone)]
pub struct CursorTracker {
    start: Cursor,
    progress: Progress,
}

impl CursorTracker {
    pub fn new(start: Cursor) -> Self {
        let progress = match start {
            Cursor::LatestByEventType { .. } => Progress::Latest {
                delivered: HashMap::new(),
            },
            _ => Progress::Range { watermark: None },
        };
        Self { start, progress }
    }

    /// The cursor the read was started with.
    pub fn start(&self) -> &Cursor {
        &self.start
    }

    pub fn is_latest_by_type(&self) -> bool {
        matches!(self.progress, Progress::Latest { .. })
    }

    /// Decide whether a delivery should reach the caller. Does not record it.
    pub fn admit(&self, subject: &Subject, id: EventId) -> Admission {
        match &self.progress {
            Progress::Range { watermark } => {
                let below_floor = match (watermark, &self.start) {
                    (Some(w), _) => id <= *w,
                    (None, Cursor::After { id: bound }) => id <= *bound,
                    (None, Cursor::From { id: bound }) => id < *bound,
                    (None, _) => false,
                };
                if below_floor {
                    Admission::Duplicate
                } else {
                    Admission::Deliver
                }
            }
            Progress::Latest { delivered } => match delivered.get(subject) {
                Some(prev) if id == *prev => Admission::Duplicate,
                Some(prev) if id < *prev => Admission::Superseded,
                _ => Admission::Deliver,
            },
        }
    }

    /// Record a delivery as accepted by the caller.
    pub fn record(&mut self, subject: &Subject, id: EventId) {
        match &mut self.progress {
            Progress::Range { watermark } => {
                let next = watermark.map_or(id, |w| w.max(id));
                *watermark = Some(next);
            }
            Progress::Latest { delivered } => {
                let entry = delivered.entry(subject.clone()).or_insert(id);
                if id > *entry {
                    *entry = id;
                }
            }
        }
        debug!(subject = %subject, id = %id, "delivery recorded");
    }

    /// Admit and, if admitted, record in one step.
    pub fn offer(&mut self, subject: &Subject, id: EventId) -> Admission {
        let verdict = self.admit(subject, id);
        if verdict == Admission::Deliver {
            self.record(subject, id);
        }
        verdict
    }

    /// Last delivered id in range mode; `None` before the first delivery and
    /// always in latest-by-type mode.
    pub fn watermark(&self) -> Option<EventId> {
        match &self.progress {
            Progress::Range { watermark } => *watermark,
            Progress::Latest { .. } => None,
        }
    }

    /// Newest id delivered for `subject` in latest-by-type mode.
    pub fn latest_delivered(&self, subject: &Subject) -> Option<EventId> {
        match &self.progress {
            Progress::Latest { delivered } => delivered.get(subject).copied(),
            Progress::Range { .. } => None,
        }
    }

    /// Cursor that resumes this read without redelivery.
    pub fn resume_cursor(&self) -> Cursor {
        match self.watermark() {
            Some(id) => Cursor::after(id),
            None => self.start.clone(),
        }
    }
}
