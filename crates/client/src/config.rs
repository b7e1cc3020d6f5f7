//! Client configuration.
//!
//! Configuration is resolved once, validated, and then shared read-only by
//! every operation of a [`GenesisClient`](crate::GenesisClient).

use std::time::Duration;

use thiserror::Error;

use genesisdb_core::ClientError;

pub const ENV_API_URL: &str = "GENESISDB_API_URL";
pub const ENV_API_VERSION: &str = "GENESISDB_API_VERSION";
pub const ENV_AUTH_TOKEN: &str = "GENESISDB_AUTH_TOKEN";

const DEFAULT_USER_AGENT: &str = "genesisdb-sdk";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::validation(err.to_string())
    }
}

/// Connection settings for one GenesisDB deployment.
#[derive(Clone)]
pub struct ClientConfig {
    api_url: String,
    api_version: String,
    auth_token: String,
    request_timeout: Duration,
    audit_timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl ClientConfig {
    pub fn new(
        api_url: impl Into<String>,
        api_version: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_url = api_url.into().trim().trim_end_matches('/').to_string();
        let api_version = api_version.into().trim().trim_matches('/').to_string();
        let auth_token = auth_token.into().trim().to_string();

        if api_url.is_empty() {
            return Err(ConfigError::Invalid("api_url must not be empty".into()));
        }
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_url '{api_url}' must be an http(s) URL"
            )));
        }
        if api_version.is_empty() {
            return Err(ConfigError::Invalid("api_version must not be empty".into()));
        }
        if auth_token.is_empty() {
            return Err(ConfigError::Invalid("auth_token must not be empty".into()));
        }

        Ok(Self {
            api_url,
            api_version,
            auth_token,
            request_timeout: Duration::from_secs(30),
            audit_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Read `GENESISDB_API_URL`, `GENESISDB_API_VERSION` and `GENESISDB_AUTH_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    ///
    /// All missing variables are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = read(ENV_API_URL);
        let version = read(ENV_API_VERSION);
        let token = read(ENV_AUTH_TOKEN);

        let missing: Vec<&'static str> = [
            (ENV_API_URL, url.is_none()),
            (ENV_API_VERSION, version.is_none()),
            (ENV_AUTH_TOKEN, token.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (url, version, token) {
            (Some(url), Some(version), Some(token)) => Self::new(url, version, token),
            _ => Err(ConfigError::MissingVariables(missing)),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub(crate) fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn audit_timeout(&self) -> Duration {
        self.audit_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// `{api_url}/api/{api_version}/{path}`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.api_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }
}

impl core::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("auth_token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("audit_timeout", &self.audit_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
