//! Authenticated session endpoints: current user and logout.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HextokError, HextokResult};
use crate::http::ApiClient;

pub const PROFILE_PATH: &str = "/api/v1/users/me";
pub const LOGOUT_PATH: &str = "/api/v1/oauth/logout";

/// Signed-in user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    #[serde(alias = "userName")]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

fn id_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `Unauthorized` on 401, `Network` for anything else that fails.
    async fn fetch_profile(&self, token: &str) -> HextokResult<User>;

    /// Server-side session invalidation.
    async fn logout(&self, token: &str) -> HextokResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: ApiClient,
}

impl HttpSessionApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn fetch_profile(&self, token: &str) -> HextokResult<User> {
        let response = self
            .client
            .http()
            .get(self.client.url(PROFILE_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(HextokError::http_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|err| HextokError::network("Failed to parse user profile").with_details(err.to_string()))
    }

    async fn logout(&self, token: &str) -> HextokResult<()> {
        let response = self
            .client
            .http()
            .get(self.client.url(LOGOUT_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HextokError::http_status(status.as_u16(), &body));
        }
        Ok(())
    }
}
