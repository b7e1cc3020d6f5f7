//! `genesisdb-events`: event envelopes and read positions.
//!
//! - [`envelope`]: outbound [`NewEvent`]s and delivered [`Event`]s
//! - [`cursor`]: where a read starts ([`Cursor`]) and how far it got ([`CursorTracker`])

pub mod cursor;
pub mod envelope;

pub use cursor::{Admission, Cursor, CursorTracker};
pub use envelope::{Event, EventOptions, NewEvent};
