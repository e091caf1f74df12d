//! Shared HTTP client for the Hextok API.

use std::time::Duration;

use crate::config::Config;
use crate::error::{HextokError, HextokResult};

const USER_AGENT: &str = concat!("hextok/", env!("CARGO_PKG_VERSION"));

/// Base URL plus a configured `reqwest` client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    /// Returns `Network` if the TLS backend fails to initialize.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> HextokResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| HextokError::network("Failed to build HTTP client").with_details(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// # Errors
    /// See [`ApiClient::new`].
    pub fn from_config(config: &Config) -> HextokResult<Self> {
        Self::new(config.api_base(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("https://api.example.test/", None).unwrap();
        assert_eq!(client.base_url(), "https://api.example.test");
        assert_eq!(
            client.url("/api/v1/users/me"),
            "https://api.example.test/api/v1/users/me"
        );
    }
}
