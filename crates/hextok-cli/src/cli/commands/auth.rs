//! Auth command handlers.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use hextok_core::config::Config;
use hextok_core::deeplink::DeepLinkSource;
use hextok_core::oauth::{FlowOutcome, SessionToken, mask_token};
use hextok_core::{AuthStatus, HextokError};

use crate::cli::app::App;

pub async fn login_with_token(config: &Config, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("Token cannot be empty");
    }

    let app = App::new(config)?;
    println!("Exchanging token {}...", mask_token(token));
    let session = app.auth.login(token).await.map_err(sign_in_error)?;
    print_signed_in(&session, &app.auth.status());
    Ok(())
}

pub async fn login(config: &Config) -> Result<()> {
    let app = App::new(config)?;

    if app.auth.get_token().await.is_some() {
        println!("Already signed in.");
        print!("Do you want to replace the existing session? [y/N] ");
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().lock().read_line(&mut response)?;
        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Login cancelled.");
            return Ok(());
        }
    }

    println!("To sign in to Hextok with {}:", config.oauth_provider);
    println!();
    println!("  1. A browser window will open (or visit the URL below)");
    println!("  2. Sign in and authorize Hextok");
    println!("  3. Copy the {} URL you are redirected to", config.callback_uri());
    println!("  4. Paste it here");
    println!();

    // Shares the exchange guard with deep-link handling.
    let flow = app.bootstrap()?.oauth_flow(config, app.capabilities.browser()?);
    match flow.run().await {
        FlowOutcome::Authenticated(session) => {
            print_signed_in(&session, &app.auth.status());
            Ok(())
        }
        FlowOutcome::Failed { message } => anyhow::bail!(message),
        FlowOutcome::Cancelled => {
            println!("Login cancelled.");
            Ok(())
        }
        FlowOutcome::Dismissed => {
            println!("Login dismissed.");
            Ok(())
        }
        FlowOutcome::AlreadyHandled => {
            println!("This sign-in was already handled.");
            Ok(())
        }
    }
}

pub async fn logout(config: &Config) -> Result<()> {
    let app = App::new(config)?;
    if app.auth.get_token().await.is_none() {
        println!("Not signed in (no session found).");
        return Ok(());
    }

    app.auth.logout().await;
    println!("✓ Signed out");
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let app = App::new(config)?;
    let status = app.auth.refresh_status().await;
    println!("{}", describe_status(&status));

    match app.source.get_last_deep_link().await {
        Ok(Some(payload)) => println!("Pending deep link: {}", payload.url),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "Failed to read last deep link"),
    }
    Ok(())
}

pub fn describe_status(status: &AuthStatus) -> String {
    match status {
        AuthStatus::Loading => "Loading".to_string(),
        AuthStatus::Authenticated(user) => format!("Signed in as {} (id {})", user.username, user.id),
        AuthStatus::Unauthenticated => "Not signed in".to_string(),
    }
}

fn print_signed_in(session: &SessionToken, status: &AuthStatus) {
    println!();
    println!("✓ Signed in (session: {})", mask_token(&session.token));
    if let AuthStatus::Authenticated(user) = status {
        println!("  User: {} (id {})", user.username, user.id);
    }
}

fn sign_in_error(err: HextokError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

#[cfg(test)]
mod tests {
    use hextok_core::User;

    use super::*;

    #[test]
    fn test_describe_status() {
        let user = User {
            id: "5".to_string(),
            username: "ada".to_string(),
            email: None,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(
            describe_status(&AuthStatus::Authenticated(user)),
            "Signed in as ada (id 5)"
        );
        assert_eq!(describe_status(&AuthStatus::Unauthenticated), "Not signed in");
    }
}
