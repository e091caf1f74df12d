//! Terminal stand-in for the native auth session.
//!
//! Opens the system browser and asks for the final redirect URL on stdin,
//! since a terminal cannot intercept the custom-scheme redirect.

use std::env;
use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use hextok_core::error::{ErrorKind, HextokError, HextokResult};
use hextok_core::native::{AuthSessionOptions, AuthSessionResult, WebBrowser};

/// Set to skip launching a browser (tests, headless machines).
const NO_BROWSER_ENV: &str = "HEXTOK_NO_BROWSER";

#[derive(Debug, Clone, Copy)]
pub struct SystemBrowser;

#[async_trait]
impl WebBrowser for SystemBrowser {
    async fn open_browser(&self, url: &str) -> HextokResult<()> {
        if env::var_os(NO_BROWSER_ENV).is_some() {
            return Ok(());
        }
        open::that(url).map_err(|err| {
            HextokError::new(ErrorKind::ModuleUnavailable, "Failed to open browser").with_details(err.to_string())
        })
    }

    async fn open_auth_session(
        &self,
        auth_url: &str,
        redirect_url: &str,
        _options: &AuthSessionOptions,
    ) -> HextokResult<AuthSessionResult> {
        println!("Authorization URL:");
        println!("  {auth_url}");
        println!();

        // Best effort; the URL is printed above.
        if let Err(err) = self.open_browser(auth_url).await {
            tracing::debug!(error = %err, "Could not launch browser");
        }

        let input = tokio::task::spawn_blocking(|| -> io::Result<String> {
            print!("Paste the redirect URL (empty to cancel): ");
            io::stdout().flush()?;
            let mut input = String::new();
            io::stdin().lock().read_line(&mut input)?;
            Ok(input)
        })
        .await
        .map_err(|err| HextokError::new(ErrorKind::ModuleUnavailable, "Input task failed").with_details(err.to_string()))?
        .map_err(|err| HextokError::new(ErrorKind::ModuleUnavailable, "Failed to read input").with_details(err.to_string()))?;

        let url = input.trim();
        if url.is_empty() {
            return Ok(AuthSessionResult::Cancel);
        }
        if !url.starts_with(redirect_url) {
            return Err(HextokError::malformed(format!("Expected a URL starting with {redirect_url}")));
        }
        Ok(AuthSessionResult::Success { url: url.to_string() })
    }

    async fn dismiss_auth_session(&self) -> HextokResult<()> {
        Ok(())
    }
}
