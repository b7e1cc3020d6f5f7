//! `genesisdb-core`: protocol primitives shared by every GenesisDB crate.
//!
//! This crate contains **pure** value types (no IO): event identifiers, subject
//! paths, commit preconditions and the client error taxonomy.

pub mod error;
pub mod id;
pub mod precondition;
pub mod subject;

pub use error::{ClientError, ClientResult};
pub use id::EventId;
pub use precondition::{Precondition, PreconditionKind};
pub use subject::Subject;
