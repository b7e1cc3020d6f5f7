//! `genesisdb-client`: protocol engine for a remote GenesisDB event store.
//!
//! Writers append with [`GenesisClient::commit`], guarded by server-evaluated
//! [`Precondition`]s. Readers take a finite snapshot with
//! [`GenesisClient::stream`] or tail live with [`GenesisClient::observe`],
//! which resumes across disconnects without duplicates or gaps.

mod client;
mod commit;
pub mod config;
pub mod maintenance;
pub mod ndjson;
pub mod observe;
mod query;
mod status;
mod stream;
mod wire;

pub use client::GenesisClient;
pub use commit::CommitReceipt;
pub use config::{ClientConfig, ConfigError};
pub use maintenance::{AuditReport, PingStatus};
pub use observe::{ObserveOptions, Observation, ObserverState, ReconnectPolicy};
pub use stream::EventBatch;

pub use genesisdb_core::{
    ClientError, ClientResult, EventId, Precondition, PreconditionKind, Subject,
};
pub use genesisdb_events::{Cursor, Event, EventOptions, NewEvent};
