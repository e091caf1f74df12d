//! Auth state: the single owner of the session token.
//!
//! The token is read from the key-value store once and then served from an
//! in-memory cache that only changes through this manager. Writes update the
//! cache first so readers see a new token immediately, then persist it.
//! Status changes are published on a `watch` channel.

mod api;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

pub use api::{HttpSessionApi, LOGOUT_PATH, PROFILE_PATH, SessionApi, User};

use crate::config::Config;
use crate::error::HextokResult;
use crate::http::ApiClient;
use crate::native::KeyValueStore;
use crate::oauth::{HttpTokenExchanger, SessionToken, TokenExchanger, mask_token};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Derived authentication status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// Token being read or profile being fetched.
    Loading,
    Authenticated(User),
    Unauthenticated,
}

impl AuthStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthStatus::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthStatus::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

pub struct AuthManager {
    store: Arc<dyn KeyValueStore>,
    session_key: String,
    exchanger: Arc<dyn TokenExchanger>,
    api: Arc<dyn SessionApi>,
    profile_retries: u32,
    retry_delay: Duration,
    /// `None` until the store has been read once.
    token: RwLock<Option<Option<String>>>,
    profile: RwLock<Option<User>>,
    status: watch::Sender<AuthStatus>,
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("session_key", &self.session_key)
            .field("profile_retries", &self.profile_retries)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        session_key: impl Into<String>,
        exchanger: Arc<dyn TokenExchanger>,
        api: Arc<dyn SessionApi>,
    ) -> Self {
        let (status, _) = watch::channel(AuthStatus::Loading);
        Self {
            store,
            session_key: session_key.into(),
            exchanger,
            api,
            profile_retries: 2,
            retry_delay: DEFAULT_RETRY_DELAY,
            token: RwLock::new(None),
            profile: RwLock::new(None),
            status,
        }
    }

    /// HTTP-backed manager using the configured API base and storage key.
    ///
    /// # Errors
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> HextokResult<Self> {
        let client = ApiClient::from_config(config)?;
        Ok(Self::new(
            store,
            config.storage.session_key.clone(),
            Arc::new(HttpTokenExchanger::new(client.clone())),
            Arc::new(HttpSessionApi::new(client)),
        )
        .with_profile_retries(config.profile_retries))
    }

    #[must_use]
    pub fn with_profile_retries(mut self, retries: u32) -> Self {
        self.profile_retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Current bearer token.
    ///
    /// A failed store read answers "no token" without being cached, so the
    /// next call reads the store again.
    pub async fn get_token(&self) -> Option<String> {
        if let Some(cached) = self.token_slot() {
            return cached;
        }

        let stored = match self.store.get_item(&self.session_key).await {
            Ok(value) => value.filter(|t| !t.is_empty()),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read session token");
                return self.cached_token();
            }
        };

        let mut cache = self.token.write().unwrap_or_else(PoisonError::into_inner);
        // A store_token that raced this read wins.
        cache.get_or_insert(stored).clone()
    }

    fn token_slot(&self) -> Option<Option<String>> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cache-only peek; `None` when the store has not been read yet.
    fn cached_token(&self) -> Option<String> {
        self.token_slot().flatten()
    }

    pub fn cached_profile(&self) -> Option<User> {
        self.profile.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fetches the profile for `token`.
    ///
    /// Network failures are retried `profile_retries` times. A 401 is never
    /// retried and drops the session if `token` is still the current one.
    ///
    /// # Errors
    /// `Unauthorized` on 401, otherwise the last failure.
    pub async fn fetch_profile(&self, token: &str) -> HextokResult<User> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.fetch_profile(token).await {
                Ok(user) => {
                    if self.cached_token().as_deref() == Some(token) {
                        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
                    }
                    return Ok(user);
                }
                Err(err) if err.is_unauthorized() => {
                    tracing::warn!(token = %mask_token(token), "Session rejected by server");
                    self.invalidate_if_current(token).await;
                    return Err(err);
                }
                Err(err) if err.is_retryable() && attempt < self.profile_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "Retrying profile fetch");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Makes `session` the current session.
    ///
    /// The cache is updated before the durable write, so `get_token` returns
    /// the new value even while the write is in flight.
    ///
    /// # Errors
    /// Returns `Storage` if the durable write fails. The previous session is
    /// then restored and the status recomputed, so it never stays `Loading`.
    pub async fn store_token(&self, session: &SessionToken) -> HextokResult<()> {
        let previous_token = self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Some(session.token.clone()));
        let previous_profile = self.profile.write().unwrap_or_else(PoisonError::into_inner).take();
        self.status.send_replace(AuthStatus::Loading);

        if let Err(err) = self.store.set_item(&self.session_key, &session.token).await {
            tracing::error!(error = %err, "Failed to persist session token");
            let rolled_back = {
                let mut cache = self.token.write().unwrap_or_else(PoisonError::into_inner);
                // Only undo our own write; a newer store_token or logout wins.
                if cache.as_ref().and_then(Option::as_deref) == Some(session.token.as_str()) {
                    *cache = previous_token;
                    *self.profile.write().unwrap_or_else(PoisonError::into_inner) = previous_profile;
                    true
                } else {
                    false
                }
            };
            if rolled_back {
                self.refresh_status().await;
            }
            return Err(err);
        }
        tracing::debug!(user_id = session.user_id, "Session token stored");
        Ok(())
    }

    /// Exchanges a one-time token and stores the resulting session.
    ///
    /// # Errors
    /// `ExchangeFailed` from the exchanger, or `Storage`.
    pub async fn exchange_and_store(&self, mobile_token: &str) -> HextokResult<SessionToken> {
        let session = self.exchanger.exchange(mobile_token).await?;
        self.store_token(&session).await?;
        Ok(session)
    }

    /// Exchange, store, then refresh the status with the new credential.
    ///
    /// # Errors
    /// See [`AuthManager::exchange_and_store`].
    pub async fn login(&self, mobile_token: &str) -> HextokResult<SessionToken> {
        let session = self.exchange_and_store(mobile_token).await?;
        self.refresh_status().await;
        Ok(session)
    }

    /// Best-effort server logout, then unconditional local sign-out.
    pub async fn logout(&self) {
        if let Some(token) = self.get_token().await
            && let Err(err) = self.api.logout(&token).await
        {
            tracing::warn!(error = %err, "Server logout failed, clearing local session anyway");
        }
        self.clear_session().await;
        tracing::info!("Signed out");
    }

    async fn invalidate_if_current(&self, token: &str) {
        if self.cached_token().as_deref() == Some(token) {
            self.clear_session().await;
        }
    }

    async fn clear_session(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(None);
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.status.send_replace(AuthStatus::Unauthenticated);

        if let Err(err) = self.store.remove_item(&self.session_key).await {
            tracing::warn!(error = %err, "Failed to remove session token");
        }
    }

    /// Recomputes the status from the token and a profile fetch, and
    /// publishes it.
    pub async fn refresh_status(&self) -> AuthStatus {
        self.status.send_replace(AuthStatus::Loading);

        let Some(token) = self.get_token().await else {
            self.status.send_replace(AuthStatus::Unauthenticated);
            return AuthStatus::Unauthenticated;
        };

        let status = match self.fetch_profile(&token).await {
            Ok(user) => AuthStatus::Authenticated(user),
            Err(err) => {
                if !err.is_unauthorized() {
                    tracing::warn!(error = %err, "Profile fetch failed");
                }
                AuthStatus::Unauthenticated
            }
        };

        // A newer token was stored while fetching; its own refresh publishes.
        if self.cached_token().as_deref() != Some(token.as_str()) {
            return self.status();
        }
        self.status.send_replace(status.clone());
        status
    }

    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status.borrow().is_authenticated()
    }
}
