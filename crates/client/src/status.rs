//! Mapping of HTTP failures onto the client error taxonomy.

use serde_json::Value as JsonValue;
use tracing::warn;

use genesisdb_core::{ClientError, Precondition, PreconditionKind};

/// The operation a response belongs to; some statuses mean different things
/// per endpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Operation<'a> {
    Commit(&'a [Precondition]),
    Read,
    Query,
    Erase,
    Ping,
    Audit,
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::Commit(_) => "commit",
            Operation::Read => "read",
            Operation::Query => "query",
            Operation::Erase => "erase",
            Operation::Ping => "ping",
            Operation::Audit => "audit",
        }
    }
}

/// Consume a non-success response and turn it into a typed error.
pub(crate) async fn error_from_response(resp: reqwest::Response, op: Operation<'_>) -> ClientError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let err = classify(status, &body, op);
    warn!(
        operation = op.name(),
        status,
        category = err.category(),
        error = %err,
        "request rejected by server"
    );
    err
}

pub(crate) fn classify(status: u16, body: &str, op: Operation<'_>) -> ClientError {
    let detail = detail_from_body(status, body);
    match (status, op) {
        (400 | 422, Operation::Query) => ClientError::QuerySyntax(detail),
        (400 | 422, _) => ClientError::Validation(detail),
        (401 | 403, _) => ClientError::Unauthorized(detail),
        (404, _) => ClientError::NotFound(detail),
        (409, _) => ClientError::Conflict(detail),
        (412, Operation::Commit(submitted)) => ClientError::PreconditionFailed {
            failed: failed_preconditions(body, submitted),
            detail,
        },
        (412, _) => ClientError::PreconditionFailed {
            failed: failed_preconditions(body, &[]),
            detail,
        },
        (429 | 502 | 503 | 504, _) => ClientError::Unavailable(detail),
        (500..=599, Operation::Query) => ClientError::QueryExecution(detail),
        (500..=599, Operation::Ping) => ClientError::Unavailable(detail),
        (status, _) => ClientError::Server { status, detail },
    }
}

/// Human-readable detail: a JSON `error`/`message`/`detail` field, else the raw body.
fn detail_from_body(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(JsonValue::Object(obj)) = serde_json::from_str::<JsonValue>(trimmed) {
        for key in ["error", "message", "detail"] {
            if let Some(text) = obj.get(key).and_then(JsonValue::as_str) {
                return text.to_string();
            }
        }
    }
    if trimmed.is_empty() {
        format!("HTTP {status} with empty body")
    } else {
        trimmed.to_string()
    }
}

/// Which preconditions failed, as identified by the server.
///
/// Recognised shapes: `failedPreconditions` / `preconditions` arrays (of kind
/// strings or `{"type": ...}` objects), or a single `precondition` / `type`
/// string. When the server does not say, every submitted kind is reported.
fn failed_preconditions(body: &str, submitted: &[Precondition]) -> Vec<PreconditionKind> {
    let mut kinds = Vec::new();

    if let Ok(JsonValue::Object(obj)) = serde_json::from_str::<JsonValue>(body.trim()) {
        for key in ["failedPreconditions", "preconditions"] {
            if let Some(items) = obj.get(key).and_then(JsonValue::as_array) {
                kinds.extend(items.iter().filter_map(kind_of));
            }
        }
        for key in ["precondition", "type"] {
            if let Some(kind) = obj.get(key).and_then(kind_of) {
                kinds.push(kind);
            }
        }
    }

    if kinds.is_empty() {
        kinds.extend(submitted.iter().map(Precondition::kind));
    }
    let mut unique = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if !unique.contains(&kind) {
            unique.push(kind);
        }
    }
    unique
}

fn kind_of(value: &JsonValue) -> Option<PreconditionKind> {
    let name = match value {
        JsonValue::String(s) => s.as_str(),
        JsonValue::Object(obj) => obj.get("type").and_then(JsonValue::as_str)?,
        _ => return None,
    };
    name.parse().ok()
}

/// Map a request that never produced a response.
pub(crate) fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ClientError::transport(format!("connection failed: {err}"))
    } else {
        ClientError::transport(err.to_string())
    }
}
