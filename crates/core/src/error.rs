//! Client error model.

use thiserror::Error;

use crate::precondition::PreconditionKind;

/// Result type used across the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client-level error.
///
/// Every variant corresponds to a machine-distinguishable category so callers
/// can branch on the failure without parsing messages.
///
/// ## Propagation
///
/// - `Validation` is always raised locally, before any network interaction
///   (or when the server reports a validation category).
/// - `Transport` during `commit` is surfaced as-is: the batch may or may not
///   have been applied and the client never retries it.
/// - `Transport`, `Unavailable` and `Server` are absorbed by the observer's
///   reconnect loop; every other category ends an observation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Malformed input detected before sending (or rejected by server validation).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An atomic commit precondition did not hold; nothing was appended.
    #[error("precondition failed ({}): {}", format_kinds(.failed), .detail)]
    PreconditionFailed {
        failed: Vec<PreconditionKind>,
        detail: String,
    },

    /// Server-detected state conflict outside of preconditions.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Structurally invalid or nonexistent addressing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server could not parse or validate a query program.
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    /// The server failed while executing a query program.
    #[error("query execution error: {0}")]
    QueryExecution(String),

    /// The server is unreachable or reports itself unhealthy.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The bearer credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network-level failure; the outcome of the request is unknown.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server response violates the documented contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal server failure outside the other categories.
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
}

fn format_kinds(kinds: &[PreconditionKind]) -> String {
    if kinds.is_empty() {
        return "unidentified".to_string();
    }
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition_failed(failed: Vec<PreconditionKind>, detail: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            failed,
            detail: detail.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether a long-lived read may transparently reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Unavailable(_) | ClientError::Server { .. }
        )
    }

    /// Stable category name, suitable for log fields and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Validation(_) => "validation",
            ClientError::PreconditionFailed { .. } => "precondition_failed",
            ClientError::Conflict(_) => "conflict",
            ClientError::NotFound(_) => "not_found",
            ClientError::QuerySyntax(_) => "query_syntax",
            ClientError::QueryExecution(_) => "query_execution",
            ClientError::Unavailable(_) => "unavailable",
            ClientError::Unauthorized(_) => "unauthorized",
            ClientError::Transport(_) => "transport",
            ClientError::Protocol(_) => "protocol",
            ClientError::Server { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_and_server_side_failures_are_retryable() {
        assert!(ClientError::transport("reset").is_retryable());
        assert!(ClientError::unavailable("503").is_retryable());
        assert!(
            ClientError::Server {
                status: 500,
                detail: "boom".into()
            }
            .is_retryable()
        );

        assert!(!ClientError::Unauthorized("expired".into()).is_retryable());
        assert!(!ClientError::protocol("missing id").is_retryable());
        assert!(!ClientError::not_found("/x").is_retryable());
        assert!(!ClientError::validation("empty").is_retryable());
    }

    #[test]
    fn precondition_failure_message_names_the_failing_kinds() {
        let err = ClientError::precondition_failed(
            vec![PreconditionKind::IsSubjectNew],
            "subject already has events",
        );
        assert_eq!(
            err.to_string(),
            "precondition failed (isSubjectNew): subject already has events"
        );

        let unidentified = ClientError::precondition_failed(vec![], "rejected");
        assert!(unidentified.to_string().contains("unidentified"));
        assert_eq!(unidentified.category(), "precondition_failed");
    }
}
