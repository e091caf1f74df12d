//! Hextok client core (auth state, deep links, OAuth exchange, bootstrap).

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod deeplink;
pub mod error;
pub mod http;
pub mod logging;
pub mod native;
pub mod oauth;

#[cfg(test)]
mod testing;

pub use auth::{AuthManager, AuthStatus, User};
pub use bootstrap::{AppBootstrap, BootstrapPhase, CallbackOutcome, PollerHandle};
pub use config::Config;
pub use deeplink::DeepLinkPayload;
pub use error::{ErrorKind, HextokError, HextokResult};
pub use native::Capabilities;
