//! Erasure, liveness and audit.

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use genesisdb_core::{ClientError, ClientResult, Subject};

use crate::client::GenesisClient;
use crate::status::{Operation, error_from_response, transport_error};
use crate::wire::EraseRequest;

/// Liveness answer from `/status/ping`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    message: String,
}

impl PingStatus {
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Integrity report from `/status/audit`.
///
/// `details` is populated when the server answers with JSON; `raw` always
/// holds the body as received.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    raw: String,
    details: Option<JsonValue>,
}

impl AuditReport {
    pub(crate) fn from_body(raw: String) -> Self {
        let details = serde_json::from_str(raw.trim()).ok();
        Self { raw, details }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn details(&self) -> Option<&JsonValue> {
        self.details.as_ref()
    }
}

impl GenesisClient {
    /// Replace the payload of every event of `subject` with a tombstone.
    ///
    /// Ids, types and timestamps survive, so cursors already handed out stay
    /// valid. Erasing a subject that was already erased succeeds.
    pub async fn erase_data(&self, subject: &Subject) -> ClientResult<()> {
        info!(subject = %subject, "erasing subject data");

        let response = self
            .post("erase")
            .timeout(self.config().request_timeout())
            .json(&EraseRequest { subject })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Erase).await);
        }
        Ok(())
    }

    /// Cheap liveness probe. Any failure to reach the server is
    /// [`ClientError::Unavailable`].
    pub async fn ping(&self) -> ClientResult<PingStatus> {
        let response = self
            .get("status/ping")
            .timeout(self.config().request_timeout())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "ping failed");
                ClientError::unavailable(format!("server unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Ping).await);
        }

        let message = response
            .text()
            .await
            .map_err(|e| ClientError::unavailable(format!("ping response lost: {e}")))?;
        Ok(PingStatus {
            message: message.trim().to_string(),
        })
    }

    /// Ask the server to verify log integrity. May take much longer than other
    /// requests; bounded by the configured audit timeout.
    pub async fn audit(&self) -> ClientResult<AuditReport> {
        info!("requesting audit");

        let response = self
            .get("status/audit")
            .timeout(self.config().audit_timeout())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Operation::Audit).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        Ok(AuditReport::from_body(body))
    }
}
