//! At-most-once exchange per one-time token.
//!
//! The launch-time resolution, the background poller and the browser flow can
//! all see the same callback before it is cleared. Each must claim the token
//! here first; only the first claim proceeds. Tokens are keyed by their
//! SHA-256 digest so the raw value is never retained.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    InFlight,
    Succeeded,
    /// Failed or abandoned. The token may already be consumed server-side.
    Failed,
}

#[derive(Debug, Default)]
pub struct ExchangeGuard {
    entries: Mutex<HashMap<String, ExchangeState>>,
}

impl ExchangeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `token`. Returns `None` if it was claimed before.
    pub fn try_begin(&self, token: &str) -> Option<ExchangeTicket<'_>> {
        let key = digest(token);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = entries.get(&key) {
            tracing::debug!(?state, "Skipping already claimed mobile token");
            return None;
        }
        entries.insert(key.clone(), ExchangeState::InFlight);
        Some(ExchangeTicket {
            guard: self,
            key,
            finished: false,
        })
    }

    pub fn state(&self, token: &str) -> Option<ExchangeState> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&digest(token))
            .copied()
    }

    fn set(&self, key: &str, state: ExchangeState) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), state);
    }
}

/// Claim on one token. Dropping it unfinished records a failure.
#[derive(Debug)]
pub struct ExchangeTicket<'a> {
    guard: &'a ExchangeGuard,
    key: String,
    finished: bool,
}

impl ExchangeTicket<'_> {
    pub fn succeed(mut self) {
        self.finished = true;
        self.guard.set(&self.key, ExchangeState::Succeeded);
    }

    pub fn fail(mut self) {
        self.finished = true;
        self.guard.set(&self.key, ExchangeState::Failed);
    }
}

impl Drop for ExchangeTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.guard.set(&self.key, ExchangeState::Failed);
        }
    }
}

fn digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
