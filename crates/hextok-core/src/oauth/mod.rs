//! Mobile OAuth: callback parsing, token exchange, and the browser flow.
//!
//! The provider redirects to `<scheme>://oauth/callback` with either a
//! one-time `token` plus `user_id`, or an `error`. The one-time token is
//! exchanged exactly once for a session token; it is never persisted.

pub mod exchange;
pub mod flow;
pub mod guard;

pub use exchange::{EXCHANGE_PATH, HttpTokenExchanger, SessionToken, TokenExchanger};
pub use flow::{FlowOutcome, MobileOAuthFlow, start_url};
pub use guard::{ExchangeGuard, ExchangeState, ExchangeTicket};

use crate::deeplink::{DeepLinkPayload, parse_url};
use crate::error::HextokResult;

/// Query parameters of an OAuth callback link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCallbackParams {
    pub token: Option<String>,
    pub user_id: Option<i64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// What to do with a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// The provider reported a failure.
    ProviderError {
        error: String,
        description: Option<String>,
    },
    /// Neither an error nor a usable token/user pair.
    MissingParams,
    Exchange { token: String, user_id: i64 },
}

impl OAuthCallbackParams {
    /// Extracts callback parameters. Empty values count as absent; a
    /// non-numeric `user_id` is treated as missing.
    pub fn from_payload(payload: &DeepLinkPayload) -> Self {
        let get = |key: &str| {
            payload
                .param(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            token: get("token"),
            user_id: get("user_id").and_then(|id| id.trim().parse().ok()),
            error: get("error"),
            error_description: get("error_description"),
        }
    }

    /// # Errors
    /// Returns `MalformedPayload` when `url` does not parse.
    pub fn from_url(url: &str) -> HextokResult<Self> {
        parse_url(url).map(|payload| Self::from_payload(&payload))
    }

    pub fn classify(&self) -> CallbackAction {
        if let Some(error) = &self.error {
            return CallbackAction::ProviderError {
                error: error.clone(),
                description: self.error_description.clone(),
            };
        }
        match (&self.token, self.user_id) {
            (Some(token), Some(user_id)) => CallbackAction::Exchange {
                token: token.clone(),
                user_id,
            },
            _ => CallbackAction::MissingParams,
        }
    }
}

/// Masks a token for logs: a short prefix and the length.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 12 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}...({} chars)", token.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_callback_exchanges() {
        let params = OAuthCallbackParams::from_url("hextok://oauth/callback?token=abc&user_id=5").unwrap();
        assert_eq!(
            params.classify(),
            CallbackAction::Exchange {
                token: "abc".to_string(),
                user_id: 5
            }
        );
    }

    #[test]
    fn test_error_wins_over_token() {
        let params = OAuthCallbackParams::from_url(
            "hextok://oauth/callback?error=access_denied&error_description=User+denied&token=abc&user_id=5",
        )
        .unwrap();
        assert_eq!(
            params.classify(),
            CallbackAction::ProviderError {
                error: "access_denied".to_string(),
                description: Some("User denied".to_string()),
            }
        );
    }

    #[test]
    fn test_missing_or_invalid_params() {
        for url in [
            "hextok://oauth/callback",
            "hextok://oauth/callback?token=abc",
            "hextok://oauth/callback?user_id=5",
            "hextok://oauth/callback?token=&user_id=5",
            "hextok://oauth/callback?token=abc&user_id=five",
        ] {
            let params = OAuthCallbackParams::from_url(url).unwrap();
            assert_eq!(params.classify(), CallbackAction::MissingParams, "{url}");
        }
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("abcdefghijklmnop"), "abcdef...(16 chars)");
    }
}
