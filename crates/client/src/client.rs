//! The client handle shared by every operation.

use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use genesisdb_core::{ClientError, ClientResult};

use crate::config::ClientConfig;

pub(crate) const NDJSON: &str = "application/x-ndjson";

/// Entry point for talking to one GenesisDB deployment.
///
/// Cheap to clone; clones share the immutable configuration and the HTTP
/// connection pool. Each operation issues its own request, and only the
/// observer keeps a response open beyond a single request/response cycle.
///
/// Operations live in their own modules:
/// - `commit` (commit.rs)
/// - `stream` (stream.rs)
/// - `observe` (observe/)
/// - `query` (query.rs)
/// - `erase_data`, `ping`, `audit` (maintenance.rs)
#[derive(Debug, Clone)]
pub struct GenesisClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
}

impl GenesisClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ClientError::transport(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(
            api_url = config.api_url(),
            api_version = config.api_version(),
            "GenesisDB client created"
        );

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Build a client from `GENESISDB_*` environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.config.endpoint(path))
            .bearer_auth(self.config.auth_token())
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.config.endpoint(path))
            .bearer_auth(self.config.auth_token())
            .header(CONTENT_TYPE, "text/plain")
    }

    /// POST with a per-request timeout, expecting an NDJSON body back.
    pub(crate) fn post_ndjson(&self, path: &str) -> RequestBuilder {
        self.post(path)
            .header(ACCEPT, NDJSON)
            .timeout(self.config.request_timeout())
    }
}
