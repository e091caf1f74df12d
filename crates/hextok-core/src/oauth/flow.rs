//! Browser sign-in flow.
//!
//! Opens the provider login in an ephemeral auth session that redirects to
//! the app's custom scheme, then exchanges the one-time token from the
//! callback URL.

use std::sync::Arc;

use super::guard::ExchangeGuard;
use super::{CallbackAction, OAuthCallbackParams, SessionToken};
use crate::auth::AuthManager;
use crate::config::Config;
use crate::native::{AuthSessionOptions, AuthSessionResult, WebBrowser};

const TOOLBAR_COLOR: &str = "#007AFF";

/// `GET` endpoint that starts the provider login for mobile clients.
pub fn start_url(api_base: &str, provider: &str, redirect_uri: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect_uri", redirect_uri)
        .finish();
    format!(
        "{}/api/v1/oauth/mobile/start/{provider}?{query}",
        api_base.trim_end_matches('/')
    )
}

/// Result of one sign-in attempt, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Authenticated(SessionToken),
    Failed { message: String },
    /// The user closed the browser.
    Cancelled,
    Dismissed,
    /// The same callback is already being handled elsewhere.
    AlreadyHandled,
}

impl FlowOutcome {
    fn failed(message: impl Into<String>) -> Self {
        FlowOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            FlowOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}

pub struct MobileOAuthFlow {
    api_base: String,
    provider: String,
    callback_uri: String,
    browser: Arc<dyn WebBrowser>,
    auth: Arc<AuthManager>,
    guard: Arc<ExchangeGuard>,
}

impl MobileOAuthFlow {
    pub fn new(config: &Config, browser: Arc<dyn WebBrowser>, auth: Arc<AuthManager>) -> Self {
        Self {
            api_base: config.api_base().to_string(),
            provider: config.oauth_provider.clone(),
            callback_uri: config.callback_uri(),
            browser,
            auth,
            guard: Arc::new(ExchangeGuard::new()),
        }
    }

    /// Shares the exchange guard with the bootstrap so a callback that also
    /// arrives as a deep link is exchanged once.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<ExchangeGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn start_url(&self) -> String {
        start_url(&self.api_base, &self.provider, &self.callback_uri)
    }

    pub async fn run(&self) -> FlowOutcome {
        let auth_url = self.start_url();
        tracing::info!(provider = %self.provider, "Starting mobile OAuth");

        let options = AuthSessionOptions {
            prefer_ephemeral_session: true,
            show_title: true,
            toolbar_color: Some(TOOLBAR_COLOR.to_string()),
        };
        let result = match self
            .browser
            .open_auth_session(&auth_url, &self.callback_uri, &options)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "Auth session failed to open");
                return FlowOutcome::failed(err.message);
            }
        };

        match result {
            AuthSessionResult::Success { url } => self.complete(&url).await,
            AuthSessionResult::Cancel => FlowOutcome::Cancelled,
            AuthSessionResult::Dismiss => FlowOutcome::Dismissed,
        }
    }

    /// Handles the callback URL returned by the auth session.
    pub async fn complete(&self, callback_url: &str) -> FlowOutcome {
        let Ok(params) = OAuthCallbackParams::from_url(callback_url) else {
            return FlowOutcome::failed("invalid_callback_url");
        };

        match params.classify() {
            CallbackAction::ProviderError { error, description } => {
                tracing::warn!(%error, "Provider returned an OAuth error");
                FlowOutcome::failed(description.unwrap_or(error))
            }
            CallbackAction::MissingParams => FlowOutcome::failed("OAuth callback is missing the token"),
            CallbackAction::Exchange { token, .. } => {
                let Some(ticket) = self.guard.try_begin(&token) else {
                    return FlowOutcome::AlreadyHandled;
                };
                match self.auth.login(&token).await {
                    Ok(session) => {
                        ticket.succeed();
                        FlowOutcome::Authenticated(session)
                    }
                    Err(err) => {
                        ticket.fail();
                        tracing::warn!(error = %err, "Mobile OAuth login failed");
                        FlowOutcome::failed(err.user_message())
                    }
                }
            }
        }
    }
}
