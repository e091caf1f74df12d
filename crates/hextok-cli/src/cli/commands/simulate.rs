//! Simulate command handler: deliver a deep link, run startup once, then
//! mount a router the way the app shell would.

use anyhow::{Context, Result};
use hextok_core::config::Config;
use hextok_core::deeplink::{DeepLinkRouter, DeepLinkSource, MemoryNavigator};

use super::auth::describe_status;
use super::route::describe;
use crate::cli::app::App;

pub async fn run(config: &Config, url: &str) -> Result<()> {
    let app = App::new(config)?;

    let payload = app
        .source
        .simulate(url)
        .with_context(|| format!("deliver deep link '{url}'"))?;
    if let Some(scheme) = payload.scheme.as_deref()
        && !app.source.can_handle_scheme(scheme)
    {
        tracing::warn!(scheme, expected = %config.scheme, "Deep link uses a foreign scheme");
    }
    println!("Delivered {}", payload.url);

    let bootstrap = app.bootstrap()?;
    let phase = bootstrap.run().await;
    println!("Phase: {phase:?}");

    let mut router = DeepLinkRouter::new(MemoryNavigator::default(), config.protected_routes.clone());
    if let Some(decision) = bootstrap.mount_router(&mut router).await {
        println!("Route: {}", describe(&decision));
    }

    let pending = app.source.has_deep_link().await.unwrap_or(false);
    println!("Deep link: {}", if pending { "pending" } else { "cleared" });
    println!("{}", describe_status(&app.auth.status()));
    Ok(())
}
