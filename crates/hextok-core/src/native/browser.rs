//! Web browser capability.
//!
//! Sign-in runs inside an OS auth session (Custom Tabs / `ASWebAuthenticationSession`)
//! that is isolated from app storage, so the only thing that comes back is the
//! final redirect URL.

use async_trait::async_trait;

use crate::error::HextokResult;

/// Presentation options for an auth session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSessionOptions {
    /// Do not share cookies with the system browser.
    pub prefer_ephemeral_session: bool,
    pub show_title: bool,
    /// Toolbar color as `#rrggbb`.
    pub toolbar_color: Option<String>,
}

impl Default for AuthSessionOptions {
    fn default() -> Self {
        Self {
            prefer_ephemeral_session: true,
            show_title: true,
            toolbar_color: None,
        }
    }
}

/// How an auth session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSessionResult {
    /// The provider redirected to the app's callback URL.
    Success { url: String },
    /// The user closed the browser.
    Cancel,
    /// The app dismissed the session programmatically.
    Dismiss,
}

#[async_trait]
pub trait WebBrowser: Send + Sync {
    /// Opens a URL in the regular browser.
    async fn open_browser(&self, url: &str) -> HextokResult<()>;

    /// Opens `auth_url` and resolves once the browser is redirected to
    /// `redirect_url` or closed.
    async fn open_auth_session(
        &self,
        auth_url: &str,
        redirect_url: &str,
        options: &AuthSessionOptions,
    ) -> HextokResult<AuthSessionResult>;

    /// Closes a pending auth session, if any.
    async fn dismiss_auth_session(&self) -> HextokResult<()>;
}
