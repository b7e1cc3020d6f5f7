//! Server-evaluated commit preconditions.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::subject::Subject;

/// A check the server evaluates atomically with a commit.
///
/// Serializes to the wire shape `{"type": "<kind>", "payload": {...}}`. The
/// query carried by [`Precondition::IsQueryResultTrue`] is opaque: it is
/// forwarded verbatim and never interpreted client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Precondition {
    /// The subject must have no events yet.
    IsSubjectNew { subject: Subject },
    /// The subject must already have at least one event.
    IsSubjectExisting { subject: Subject },
    /// The query must evaluate to `true` against the pre-commit state.
    IsQueryResultTrue { query: String },
}

impl Precondition {
    pub fn subject_is_new(subject: Subject) -> Self {
        Self::IsSubjectNew { subject }
    }

    pub fn subject_exists(subject: Subject) -> Self {
        Self::IsSubjectExisting { subject }
    }

    pub fn query_is_true(query: impl Into<String>) -> Self {
        Self::IsQueryResultTrue {
            query: query.into(),
        }
    }

    pub fn kind(&self) -> PreconditionKind {
        match self {
            Precondition::IsSubjectNew { .. } => PreconditionKind::IsSubjectNew,
            Precondition::IsSubjectExisting { .. } => PreconditionKind::IsSubjectExisting,
            Precondition::IsQueryResultTrue { .. } => PreconditionKind::IsQueryResultTrue,
        }
    }

    /// Shape check performed before the precondition is sent.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            Precondition::IsQueryResultTrue { query } if query.trim().is_empty() => Err(
                ClientError::validation("isQueryResultTrue requires a non-empty query"),
            ),
            _ => Ok(()),
        }
    }
}

/// The closed set of precondition kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreconditionKind {
    IsSubjectNew,
    IsSubjectExisting,
    IsQueryResultTrue,
}

impl PreconditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreconditionKind::IsSubjectNew => "isSubjectNew",
            PreconditionKind::IsSubjectExisting => "isSubjectExisting",
            PreconditionKind::IsQueryResultTrue => "isQueryResultTrue",
        }
    }
}

impl core::fmt::Display for PreconditionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreconditionKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isSubjectNew" => Ok(Self::IsSubjectNew),
            "isSubjectExisting" => Ok(Self::IsSubjectExisting),
            "isQueryResultTrue" => Ok(Self::IsQueryResultTrue),
            other => Err(ClientError::protocol(format!(
                "unknown precondition kind '{other}'"
            ))),
        }
    }
}
