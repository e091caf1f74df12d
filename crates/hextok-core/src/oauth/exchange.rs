//! One-time token → session token exchange.
//!
//! A one-time token may already be consumed by a previous attempt, so the
//! exchange is never retried here. Callers restart the OAuth flow instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::mask_token;
use crate::error::{HextokError, HextokResult};
use crate::http::ApiClient;

pub const EXCHANGE_PATH: &str = "/api/v1/oauth/mobile/exchange";

/// Session descriptor returned by a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Bearer credential
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
    pub user_id: i64,
    pub session_id: i64,
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, one_time_token: &str) -> HextokResult<SessionToken>;
}

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    token: &'a str,
}

/// `POST {api_base}/api/v1/oauth/mobile/exchange`.
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    client: ApiClient,
}

impl HttpTokenExchanger {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, one_time_token: &str) -> HextokResult<SessionToken> {
        tracing::debug!(token = %mask_token(one_time_token), "Exchanging mobile token");

        let response = self
            .client
            .http()
            .post(self.client.url(EXCHANGE_PATH))
            .json(&ExchangeRequest {
                token: one_time_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(HextokError::exchange_failed(status.as_u16(), &body));
        }

        let body = response.text().await?;
        let session: SessionToken = serde_json::from_str(&body).map_err(|err| {
            HextokError::network("Failed to parse token exchange response").with_details(err.to_string())
        })?;

        tracing::info!(
            user_id = session.user_id,
            session_id = session.session_id,
            expires_in = session.expires_in,
            "Token exchange succeeded"
        );
        Ok(session)
    }
}
