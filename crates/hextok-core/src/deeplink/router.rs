//! Maps deep-link payloads to in-app routes and applies the auth gate.
//!
//! Payloads that arrive while the auth status is still loading are parked as
//! a single pending link (a later arrival replaces an earlier one) and are
//! routed exactly once when loading finishes.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::{DeepLinkPayload, DeepLinkSource};
use crate::auth::AuthStatus;

pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/home";

/// Rewrites a payload into an in-app route.
///
/// Host-only links (`hextok://liked`) use the host as the path. The result
/// always starts with `/`; query parameters are appended in key order, and a
/// parameter without a value renders as `key=`.
pub fn normalize(payload: &DeepLinkPayload) -> String {
    let mut path = payload.path.as_str();
    if (path.is_empty() || path == "/") && !payload.host.is_empty() && payload.host != "localhost" {
        path = payload.host.as_str();
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let mut route = alias(&path).to_string();

    if !payload.query_params.is_empty() {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                payload
                    .query_params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_deref().unwrap_or_default())),
            )
            .finish();
        route.push('?');
        route.push_str(&query);
    }

    route
}

fn alias(path: &str) -> &str {
    match path {
        "/" => HOME_ROUTE,
        "/user" => "/profile",
        "/favorites" => "/liked",
        p if p.starts_with("/user/") || p.starts_with("/profile/") => "/profile",
        p => p,
    }
}

/// True when `route` falls under one of the protected prefixes.
pub fn requires_auth(route: &str, protected_routes: &[String]) -> bool {
    protected_routes
        .iter()
        .any(|prefix| route.starts_with(prefix.as_str()))
}

/// State attached to the login redirect so the login screen can resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub from: String,
    pub deep_link: DeepLinkPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    pub replace: bool,
    pub state: Option<NavigationState>,
}

/// Host-side navigation surface.
pub trait Navigator: Send + Sync {
    /// Current `pathname + search`.
    fn location(&self) -> String;
    fn navigate(&self, to: &str, options: NavigateOptions);
}

/// Navigator that records every navigation. Starts at `/home`.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<String>,
    navigations: Mutex<Vec<(String, NavigateOptions)>>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::starting_at(HOME_ROUTE)
    }
}

impl MemoryNavigator {
    pub fn starting_at(location: &str) -> Self {
        Self {
            location: Mutex::new(location.to_string()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn navigations(&self) -> Vec<(String, NavigateOptions)> {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for MemoryNavigator {
    fn location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, to: &str, options: NavigateOptions) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = to.to_string();
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to.to_string(), options));
    }
}

/// What the router did with a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Auth still loading; held as the pending link.
    Deferred,
    /// Protected target while signed out.
    RedirectToLogin { from: String },
    Navigate(String),
    /// Target equals the current location.
    Unchanged(String),
    /// Auto-navigation is off; the target was only computed.
    Observed(String),
}

type Resolver = Box<dyn Fn(&DeepLinkPayload) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Loading,
    SignedIn,
    SignedOut,
}

impl From<&AuthStatus> for Gate {
    fn from(status: &AuthStatus) -> Self {
        match status {
            AuthStatus::Loading => Gate::Loading,
            AuthStatus::Authenticated(_) => Gate::SignedIn,
            AuthStatus::Unauthenticated => Gate::SignedOut,
        }
    }
}

pub struct DeepLinkRouter<N> {
    navigator: N,
    protected_routes: Vec<String>,
    gate: Gate,
    pending: Option<DeepLinkPayload>,
    current: Option<DeepLinkPayload>,
    resolver: Option<Resolver>,
    auto_navigate: bool,
}

impl<N: fmt::Debug> fmt::Debug for DeepLinkRouter<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepLinkRouter")
            .field("navigator", &self.navigator)
            .field("protected_routes", &self.protected_routes)
            .field("gate", &self.gate)
            .field("pending", &self.pending)
            .field("has_resolver", &self.resolver.is_some())
            .field("auto_navigate", &self.auto_navigate)
            .finish_non_exhaustive()
    }
}

impl<N: Navigator> DeepLinkRouter<N> {
    /// New router in the loading state.
    pub fn new(navigator: N, protected_routes: Vec<String>) -> Self {
        Self {
            navigator,
            protected_routes,
            gate: Gate::Loading,
            pending: None,
            current: None,
            resolver: None,
            auto_navigate: true,
        }
    }

    /// Custom route resolution. Returning `None` falls back to [`normalize`].
    #[must_use]
    pub fn with_resolver(
        mut self,
        resolver: impl Fn(&DeepLinkPayload) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    #[must_use]
    pub fn auto_navigate(mut self, enabled: bool) -> Self {
        self.auto_navigate = enabled;
        self
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn pending(&self) -> Option<&DeepLinkPayload> {
        self.pending.as_ref()
    }

    /// Most recent payload handed to the router.
    pub fn current_deep_link(&self) -> Option<&DeepLinkPayload> {
        self.current.as_ref()
    }

    /// Target route for `payload`, before the auth gate.
    pub fn resolve(&self, payload: &DeepLinkPayload) -> String {
        self.resolver
            .as_ref()
            .and_then(|resolve| resolve(payload))
            .unwrap_or_else(|| normalize(payload))
    }

    /// Routes a payload, or parks it while auth is loading.
    pub fn handle(&mut self, payload: DeepLinkPayload) -> RouteDecision {
        self.current = Some(payload.clone());

        if self.gate == Gate::Loading {
            if self.pending.is_some() {
                tracing::debug!(url = %payload.url, "Replacing pending deep link");
            }
            self.pending = Some(payload);
            return RouteDecision::Deferred;
        }
        self.pending = None;

        let target = self.resolve(&payload);

        if self.gate == Gate::SignedOut && requires_auth(&target, &self.protected_routes) {
            tracing::info!(route = %target, "Deep link requires sign-in, redirecting to login");
            self.navigator.navigate(
                LOGIN_ROUTE,
                NavigateOptions {
                    replace: true,
                    state: Some(NavigationState {
                        from: target.clone(),
                        deep_link: payload,
                    }),
                },
            );
            return RouteDecision::RedirectToLogin { from: target };
        }

        if !self.auto_navigate {
            return RouteDecision::Observed(target);
        }

        if self.navigator.location() == target {
            return RouteDecision::Unchanged(target);
        }

        tracing::debug!(route = %target, "Navigating to deep link");
        self.navigator.navigate(
            &target,
            NavigateOptions {
                replace: true,
                state: None,
            },
        );
        RouteDecision::Navigate(target)
    }

    /// Updates the auth gate. Leaving the loading state routes the pending
    /// link, if any.
    pub fn set_auth(&mut self, status: &AuthStatus) -> Option<RouteDecision> {
        self.gate = Gate::from(status);
        if self.gate == Gate::Loading {
            return None;
        }
        let pending = self.pending.take()?;
        tracing::debug!(url = %pending.url, "Auth settled, routing pending deep link");
        Some(self.handle(pending))
    }

    /// Applies `status`, then routes the source's launch link.
    ///
    /// Returns the last decision taken, if any.
    pub async fn mount(&mut self, source: &dyn DeepLinkSource, status: &AuthStatus) -> Option<RouteDecision> {
        let mut decision = self.set_auth(status);
        match source.get_initial_deep_link().await {
            Ok(Some(payload)) => decision = Some(self.handle(payload)),
            Ok(None) => tracing::debug!("No initial deep link"),
            Err(err) => tracing::warn!(error = %err, "Failed to read initial deep link"),
        }
        decision
    }

    /// Routes the launch link, then runtime links and auth changes until
    /// `cancel` fires or the source closes.
    pub async fn listen(
        &mut self,
        source: &dyn DeepLinkSource,
        mut auth: watch::Receiver<AuthStatus>,
        cancel: CancellationToken,
    ) {
        let mut events = source.subscribe();
        let status = auth.borrow_and_update().clone();
        self.mount(source, &status).await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = auth.borrow_and_update().clone();
                    self.set_auth(&status);
                }
                event = events.recv() => match event {
                    Ok(payload) => {
                        self.handle(payload);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Deep link listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::auth::User;
    use crate::deeplink::{MemoryDeepLinkSource, parse_url};

    fn payload(host: &str, path: &str) -> DeepLinkPayload {
        DeepLinkPayload {
            url: format!("hextok://{host}{path}"),
            host: host.to_string(),
            path: path.to_string(),
            scheme: None,
            query_params: BTreeMap::new(),
            timestamp: 1,
        }
    }

    fn protected() -> Vec<String> {
        vec!["/profile".to_string(), "/liked".to_string()]
    }

    fn signed_in() -> AuthStatus {
        AuthStatus::Authenticated(User {
            id: "1".to_string(),
            username: "ada".to_string(),
            email: None,
            created_at: None,
            updated_at: None,
        })
    }

    #[test]
    fn test_normalize_host_only_link() {
        assert_eq!(normalize(&payload("profile", "")), "/profile");
        assert_eq!(normalize(&payload("liked", "/")), "/liked");
        assert_eq!(normalize(&payload("feed", "")), "/feed");
        // localhost never stands in for the path
        assert_eq!(normalize(&payload("localhost", "/")), "/home");
    }

    #[test]
    fn test_normalize_aliases() {
        for (path, expected) in [
            ("/", "/home"),
            ("/user", "/profile"),
            ("/user/42", "/profile"),
            ("/profile/settings", "/profile"),
            ("/favorites", "/liked"),
            ("/login", "/login"),
            ("video/9", "/video/9"),
        ] {
            assert_eq!(normalize(&payload("", path)), expected, "{path}");
        }
    }

    #[test]
    fn test_normalize_appends_sorted_query() {
        let mut link = payload("app", "/home");
        link.query_params.insert("z".to_string(), Some("last".to_string()));
        link.query_params.insert("a".to_string(), Some("x y".to_string()));
        link.query_params.insert("n".to_string(), None);
        assert_eq!(normalize(&link), "/home?a=x+y&n=&z=last");
    }

    #[test]
    fn test_normalize_valueless_flag_renders_empty() {
        let mut link = payload("feed", "");
        link.query_params.insert("debug".to_string(), None);
        let route = normalize(&link);
        assert_eq!(route, "/feed?debug=");
        assert!(!route.contains("null"));

        // A bare `?debug` in a URL parses to an empty value and renders the same.
        assert_eq!(normalize(&parse_url("hextok://feed?debug").unwrap()), route);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for link in [
            payload("profile", ""),
            payload("", "/favorites"),
            parse_url("hextok://user/7?ref=share").unwrap(),
        ] {
            assert_eq!(normalize(&link), normalize(&link));
        }
    }

    #[test]
    fn test_host_used_when_path_empty() {
        for host in ["liked", "profile", "a", "video", "x-y"] {
            let route = normalize(&payload(host, ""));
            assert!(route.starts_with('/'));
            let expected = alias(&format!("/{host}")).to_string();
            assert_eq!(route, expected);
        }
    }

    #[test]
    fn test_protected_route_redirects_to_login_when_signed_out() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());
        router.set_auth(&AuthStatus::Unauthenticated);

        let link = payload("myapp", "/liked");
        let decision = router.handle(link.clone());

        assert_eq!(
            decision,
            RouteDecision::RedirectToLogin {
                from: "/liked".to_string()
            }
        );
        let navs = router.navigator().navigations();
        assert_eq!(navs.len(), 1);
        let (to, options) = &navs[0];
        assert_eq!(to, LOGIN_ROUTE);
        assert!(options.replace);
        let state = options.state.as_ref().unwrap();
        assert_eq!(state.from, "/liked");
        assert_eq!(state.deep_link, link);
    }

    #[test]
    fn test_protected_routes_never_reach_target_while_signed_out() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());
        router.set_auth(&AuthStatus::Unauthenticated);
        for (host, path) in [("profile", ""), ("", "/user/3"), ("", "/favorites"), ("", "/liked?x=1")] {
            router.handle(payload(host, path));
        }
        assert!(
            router
                .navigator()
                .navigations()
                .iter()
                .all(|(to, _)| to == LOGIN_ROUTE)
        );
    }

    #[test]
    fn test_signed_in_navigates_and_skips_current_location() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());
        router.set_auth(&signed_in());

        assert_eq!(
            router.handle(payload("liked", "")),
            RouteDecision::Navigate("/liked".to_string())
        );
        assert_eq!(
            router.handle(payload("", "/favorites")),
            RouteDecision::Unchanged("/liked".to_string())
        );
        assert_eq!(router.navigator().navigations().len(), 1);
    }

    #[test]
    fn test_pending_link_processed_once_after_loading() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());

        assert_eq!(router.handle(payload("liked", "")), RouteDecision::Deferred);
        assert!(router.navigator().navigations().is_empty());

        // Still loading: nothing happens.
        assert_eq!(router.set_auth(&AuthStatus::Loading), None);

        let decision = router.set_auth(&signed_in());
        assert_eq!(decision, Some(RouteDecision::Navigate("/liked".to_string())));
        assert!(router.pending().is_none());

        // A second settle does not replay it.
        assert_eq!(router.set_auth(&signed_in()), None);
        assert_eq!(router.navigator().navigations().len(), 1);
    }

    #[test]
    fn test_pending_link_is_last_write_wins() {
        // A second arrival during loading silently drops the first one.
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());
        router.handle(payload("liked", ""));
        router.handle(payload("", "/video/9"));

        router.set_auth(&signed_in());

        let navs = router.navigator().navigations();
        assert_eq!(navs.len(), 1);
        assert_eq!(navs[0].0, "/video/9");
    }

    #[test]
    fn test_resolver_overrides_route_but_not_gate() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected())
            .with_resolver(|link| (link.host == "secret").then(|| "/profile/secret".to_string()));
        router.set_auth(&AuthStatus::Unauthenticated);

        assert_eq!(
            router.handle(payload("secret", "")),
            RouteDecision::RedirectToLogin {
                from: "/profile/secret".to_string()
            }
        );
        assert_eq!(
            router.handle(payload("feed", "")),
            RouteDecision::Navigate("/feed".to_string())
        );
    }

    #[test]
    fn test_auto_navigate_off_only_observes() {
        let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected()).auto_navigate(false);
        router.set_auth(&signed_in());
        assert_eq!(
            router.handle(payload("liked", "")),
            RouteDecision::Observed("/liked".to_string())
        );
        assert!(router.navigator().navigations().is_empty());
    }

    #[tokio::test]
    async fn test_listen_routes_initial_then_runtime_links() {
        let source = Arc::new(
            MemoryDeepLinkSource::new("hextok").with_initial(parse_url("hextok://liked").unwrap()),
        );
        let (auth_tx, auth_rx) = watch::channel(AuthStatus::Loading);
        let cancel = CancellationToken::new();

        let task = {
            let source = Arc::clone(&source);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut router = DeepLinkRouter::new(MemoryNavigator::default(), protected());
                router.listen(source.as_ref(), auth_rx, cancel).await;
                router.navigator().navigations()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        auth_tx.send_replace(signed_in());
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.simulate("hextok://feed").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let navs = task.await.unwrap();
        let routes: Vec<_> = navs.into_iter().map(|(to, _)| to).collect();
        assert_eq!(routes, vec!["/liked".to_string(), "/feed".to_string()]);
    }
}
