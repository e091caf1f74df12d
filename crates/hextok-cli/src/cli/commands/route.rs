//! Route command handler.

use anyhow::{Context, Result};
use hextok_core::config::Config;
use hextok_core::deeplink::router::LOGIN_ROUTE;
use hextok_core::deeplink::{DeepLinkRouter, MemoryNavigator, RouteDecision, parse_url};
use hextok_core::{AuthStatus, User};
use serde_json::json;

pub fn run(config: &Config, url: &str, authenticated: bool, current: &str, as_json: bool) -> Result<()> {
    let payload = parse_url(url).with_context(|| format!("parse deep link '{url}'"))?;
    if let Some(scheme) = payload.scheme.as_deref()
        && !scheme.eq_ignore_ascii_case(&config.scheme)
    {
        tracing::warn!(scheme, expected = %config.scheme, "Deep link uses a foreign scheme");
    }

    let status = if authenticated {
        AuthStatus::Authenticated(cli_user())
    } else {
        AuthStatus::Unauthenticated
    };

    let mut router = DeepLinkRouter::new(MemoryNavigator::starting_at(current), config.protected_routes.clone());
    router.set_auth(&status);
    let decision = router.handle(payload);

    if as_json {
        println!("{}", decision_json(&decision));
    } else {
        println!("{}", describe(&decision));
    }
    Ok(())
}

fn cli_user() -> User {
    User {
        id: "0".to_string(),
        username: "cli".to_string(),
        email: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn describe(decision: &RouteDecision) -> String {
    match decision {
        RouteDecision::Deferred => "deferred".to_string(),
        RouteDecision::RedirectToLogin { from } => format!("redirect {LOGIN_ROUTE} (from {from})"),
        RouteDecision::Navigate(route) => format!("navigate {route}"),
        RouteDecision::Unchanged(route) => format!("unchanged {route}"),
        RouteDecision::Observed(route) => format!("observed {route}"),
    }
}

fn decision_json(decision: &RouteDecision) -> serde_json::Value {
    match decision {
        RouteDecision::Deferred => json!({ "decision": "deferred" }),
        RouteDecision::RedirectToLogin { from } => {
            json!({ "decision": "redirect", "route": LOGIN_ROUTE, "from": from })
        }
        RouteDecision::Navigate(route) => json!({ "decision": "navigate", "route": route }),
        RouteDecision::Unchanged(route) => json!({ "decision": "unchanged", "route": route }),
        RouteDecision::Observed(route) => json!({ "decision": "observed", "route": route }),
    }
}
