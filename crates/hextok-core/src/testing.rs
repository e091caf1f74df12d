//! Fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::{SessionApi, User};
use crate::error::{HextokError, HextokResult};
use crate::oauth::{SessionToken, TokenExchanger};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: format!("user{id}"),
        email: None,
        created_at: None,
        updated_at: None,
    }
}

/// Exchanger that turns `abc` into `session-abc` after an optional delay.
#[derive(Debug, Default)]
pub struct FakeExchanger {
    pub delay: Duration,
    pub fail_status: Option<u16>,
    calls: AtomicUsize,
    tokens: Mutex<Vec<String>>,
}

impl FakeExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TokenExchanger for FakeExchanger {
    async fn exchange(&self, one_time_token: &str) -> HextokResult<SessionToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(one_time_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(HextokError::exchange_failed(status, "token already used"));
        }
        Ok(SessionToken {
            token: format!("session-{one_time_token}"),
            expires_in: 3600,
            user_id: 5,
            session_id: 9,
        })
    }
}

/// Session API that replays queued profile results, then succeeds.
#[derive(Debug, Default)]
pub struct FakeSessionApi {
    responses: Mutex<VecDeque<HextokResult<User>>>,
    profile_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    logout_fails: bool,
}

impl FakeSessionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile calls succeed; logout always fails with a network error.
    pub fn failing_logout() -> Self {
        Self {
            logout_fails: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn then(self, result: HextokResult<User>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionApi for FakeSessionApi {
    async fn fetch_profile(&self, _token: &str) -> HextokResult<User> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(user("5")))
    }

    async fn logout(&self, _token: &str) -> HextokResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails {
            return Err(HextokError::network("connection refused"));
        }
        Ok(())
    }
}
