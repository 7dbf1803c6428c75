//! Client configuration

use std::collections::HashMap;
use std::time::Duration;

/// Configuration for [`crate::BackendClient`]
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base project URL (e.g., "https://project.example.co")
    pub service_url: String,
    /// Public API key sent as `apikey`
    pub api_key: String,
    /// Signed-in user's access token; the API key is used when absent
    pub access_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Custom headers to include in all requests
    pub default_headers: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            access_token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("Brannvern/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
        }
    }
}

impl BackendConfig {
    /// Create a new config for a project URL and API key
    pub fn new(service_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { service_url: service_url.into(), api_key: api_key.into(), ..Default::default() }
    }

    /// Set the access token of the signed-in user
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Bearer token for the `Authorization` header
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    /// URL of the REST endpoint for `table`
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.service_url.trim_end_matches('/'), table)
    }
}
