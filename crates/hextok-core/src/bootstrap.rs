//! Startup sequencing and the background deep-link poller.
//!
//! The route tree must not mount before the last deep link has been looked
//! at, otherwise the router picks a home route that an OAuth callback would
//! immediately override. [`AppBootstrap::run`] walks
//! `Init → ResolvingDeepLink → (CallbackDetected | NoCallback) → Ready` and
//! publishes each phase; hosts mount once the phase is `Ready`, either by
//! hand or through [`AppBootstrap::mount_router`] / [`AppBootstrap::run_router`].
//!
//! Nothing here can keep startup from reaching `Ready`: native-module and
//! network failures are logged and treated as "no deep link".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::deeplink::{DeepLinkPayload, DeepLinkRouter, DeepLinkSource, Navigator, RouteDecision};
use crate::error::{HextokError, HextokResult};
use crate::native::{Capabilities, KeyValueStore, WebBrowser};
use crate::oauth::{CallbackAction, ExchangeGuard, MobileOAuthFlow, OAuthCallbackParams, SessionToken, mask_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Init,
    ResolvingDeepLink,
    CallbackDetected,
    NoCallback,
    /// Route tree may mount.
    Ready,
}

/// Result of handling one deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Not an OAuth callback; left for the router.
    NotCallback,
    /// Provider error; link cleared.
    ProviderError { error: String },
    /// No token or user id; link cleared.
    MissingParams,
    /// Session stored and link cleared.
    Exchanged(SessionToken),
    /// Exchange or storage failed; link kept.
    ExchangeFailed(HextokError),
    /// Token already claimed by another path.
    AlreadyHandled,
}

impl CallbackOutcome {
    /// Short name for logs. Never includes token material.
    pub fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::NotCallback => "not_callback",
            CallbackOutcome::ProviderError { .. } => "provider_error",
            CallbackOutcome::MissingParams => "missing_params",
            CallbackOutcome::Exchanged(_) => "exchanged",
            CallbackOutcome::ExchangeFailed(_) => "exchange_failed",
            CallbackOutcome::AlreadyHandled => "already_handled",
        }
    }
}

pub struct AppBootstrap {
    auth: Arc<AuthManager>,
    source: Arc<dyn DeepLinkSource>,
    store: Arc<dyn KeyValueStore>,
    deep_link_key: String,
    poll_interval: Duration,
    guard: Arc<ExchangeGuard>,
    phase: watch::Sender<BootstrapPhase>,
}

impl fmt::Debug for AppBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBootstrap")
            .field("deep_link_key", &self.deep_link_key)
            .field("poll_interval", &self.poll_interval)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl AppBootstrap {
    pub fn new(
        auth: Arc<AuthManager>,
        source: Arc<dyn DeepLinkSource>,
        store: Arc<dyn KeyValueStore>,
        config: &Config,
    ) -> Self {
        let (phase, _) = watch::channel(BootstrapPhase::Init);
        Self {
            auth,
            source,
            store,
            deep_link_key: config.storage.deep_link_key.clone(),
            poll_interval: config.poll_interval(),
            guard: Arc::new(ExchangeGuard::new()),
            phase,
        }
    }

    /// # Errors
    /// `ModuleUnavailable` when storage or the deep-link source is missing.
    pub fn from_capabilities(config: &Config, caps: &Capabilities, auth: Arc<AuthManager>) -> HextokResult<Self> {
        Ok(Self::new(auth, caps.deep_links()?, caps.storage()?, config))
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Exchange guard shared by deep-link handling and [`Self::oauth_flow`].
    pub fn guard(&self) -> Arc<ExchangeGuard> {
        Arc::clone(&self.guard)
    }

    /// Browser sign-in flow sharing this bootstrap's auth manager and
    /// exchange guard, so a token that also arrives as a deep link is
    /// exchanged once.
    pub fn oauth_flow(&self, config: &Config, browser: Arc<dyn WebBrowser>) -> MobileOAuthFlow {
        MobileOAuthFlow::new(config, browser, Arc::clone(&self.auth)).with_guard(self.guard())
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<BootstrapPhase> {
        self.phase.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == BootstrapPhase::Ready
    }

    /// Resolves once the phase is `Ready`.
    pub async fn wait_ready(&self) {
        let mut phases = self.phase.subscribe();
        // The sender lives as long as `self`.
        let _ = phases.wait_for(|phase| *phase == BootstrapPhase::Ready).await;
    }

    /// Waits for `Ready`, then mounts `router` with the current auth status
    /// and routes the launch link once.
    pub async fn mount_router<N: Navigator>(&self, router: &mut DeepLinkRouter<N>) -> Option<RouteDecision> {
        self.wait_ready().await;
        router.mount(self.source.as_ref(), &self.auth.status()).await
    }

    /// Waits for `Ready`, then drives `router` from this bootstrap's deep-link
    /// source and auth status until `cancel` fires.
    pub async fn run_router<N: Navigator>(&self, router: &mut DeepLinkRouter<N>, cancel: CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = self.wait_ready() => {}
        }
        router.listen(self.source.as_ref(), self.auth.subscribe(), cancel).await;
    }

    fn enter(&self, phase: BootstrapPhase) {
        tracing::debug!(?phase, "Bootstrap phase");
        self.phase.send_replace(phase);
    }

    /// Resolves the launch deep link and reaches `Ready`.
    pub async fn run(&self) -> BootstrapPhase {
        self.enter(BootstrapPhase::Init);

        if self.auth.get_token().await.is_some() {
            tracing::debug!("Session present, skipping deep link resolution");
        } else {
            self.enter(BootstrapPhase::ResolvingDeepLink);
            match self.source.get_last_deep_link().await {
                Ok(Some(payload)) if payload.is_oauth_callback() => {
                    self.enter(BootstrapPhase::CallbackDetected);
                    let outcome = self.process_payload(&payload).await;
                    tracing::info!(outcome = outcome.label(), "Launch OAuth callback handled");
                }
                Ok(Some(payload)) => {
                    tracing::debug!(url = %payload.url, "Launch deep link is not an OAuth callback");
                    self.enter(BootstrapPhase::NoCallback);
                }
                Ok(None) => self.enter(BootstrapPhase::NoCallback),
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to resolve launch deep link");
                    self.enter(BootstrapPhase::NoCallback);
                }
            }
        }

        self.enter(BootstrapPhase::Ready);
        self.auth.refresh_status().await;
        BootstrapPhase::Ready
    }

    /// Handles an OAuth callback payload.
    ///
    /// Exchange, token storage and clearing the link happen strictly in that
    /// order. A failed exchange leaves the link in place.
    pub async fn process_payload(&self, payload: &DeepLinkPayload) -> CallbackOutcome {
        if !payload.is_oauth_callback() {
            return CallbackOutcome::NotCallback;
        }
        self.persist(payload).await;

        match OAuthCallbackParams::from_payload(payload).classify() {
            CallbackAction::ProviderError { error, description } => {
                tracing::warn!(%error, description = description.as_deref().unwrap_or(""), "OAuth callback carried an error");
                self.clear().await;
                CallbackOutcome::ProviderError { error }
            }
            CallbackAction::MissingParams => {
                tracing::warn!("OAuth callback is missing token or user_id");
                self.clear().await;
                CallbackOutcome::MissingParams
            }
            CallbackAction::Exchange { token, user_id } => {
                let Some(ticket) = self.guard.try_begin(&token) else {
                    return CallbackOutcome::AlreadyHandled;
                };
                tracing::info!(token = %mask_token(&token), user_id, "Exchanging mobile token");
                match self.auth.exchange_and_store(&token).await {
                    Ok(session) => {
                        ticket.succeed();
                        self.clear().await;
                        CallbackOutcome::Exchanged(session)
                    }
                    Err(err) => {
                        ticket.fail();
                        tracing::error!(error = %err, "Mobile token exchange failed, keeping deep link");
                        CallbackOutcome::ExchangeFailed(err)
                    }
                }
            }
        }
    }

    async fn persist(&self, payload: &DeepLinkPayload) {
        if let Err(err) = self.store.set_item(&self.deep_link_key, &payload.to_json()).await {
            tracing::warn!(error = %err, "Failed to persist deep link");
        }
    }

    async fn clear(&self) {
        if let Err(err) = self.source.clear_deep_link().await {
            tracing::warn!(error = %err, "Failed to clear deep link");
        }
        if let Err(err) = self.store.remove_item(&self.deep_link_key).await {
            tracing::warn!(error = %err, "Failed to remove persisted deep link");
        }
    }

    /// Starts the poller, then resolves the launch link.
    pub async fn start(self: &Arc<Self>) -> PollerHandle {
        let poller = self.spawn_poller();
        self.run().await;
        poller
    }

    /// Re-checks the source for late deep links while signed out.
    ///
    /// Polling pauses while a session token exists and resumes after
    /// sign-out. The task ends when the handle is cancelled or dropped.
    pub fn spawn_poller(self: &Arc<Self>) -> PollerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            async move { this.poll_loop(cancel).await }
        });
        PollerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn poll_loop(&self, cancel: CancellationToken) {
        let mut auth_rx = self.auth.subscribe();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        let mut last_seen: Option<(String, i64)> = None;

        tracing::debug!(interval_ms = self.poll_interval.as_millis(), "Deep link poller started");
        loop {
            if self.auth.get_token().await.is_some() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = auth_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => self.poll_once(&mut last_seen).await,
            }
        }
        tracing::debug!("Deep link poller stopped");
    }

    async fn poll_once(&self, last_seen: &mut Option<(String, i64)>) {
        let payload = match self.source.get_last_deep_link().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "Background deep link poll failed");
                return;
            }
        };

        let key = (payload.url.clone(), payload.timestamp);
        if last_seen.as_ref() == Some(&key) {
            return;
        }
        *last_seen = Some(key);
        tracing::info!(url = %payload.url, "Background poll found deep link");

        if payload.is_oauth_callback() {
            let outcome = self.process_payload(&payload).await;
            tracing::debug!(outcome = outcome.label(), "Polled OAuth callback handled");
            if matches!(outcome, CallbackOutcome::Exchanged(_)) {
                self.auth.refresh_status().await;
            }
        } else {
            self.persist(&payload).await;
            self.clear().await;
        }
    }
}

/// Running poller. Dropping it cancels the task.
#[derive(Debug)]
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task to exit. Call [`Self::cancel`] first.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "Deep link poller panicked");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
