//! Structured errors for the auth and deep-link pipeline.
//!
//! Native-module and network failures are classified here so callers can
//! decide between collapsing to a safe default (best-effort reads) and
//! surfacing a typed failure (user-initiated actions like login).

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required native binding is missing.
    ModuleUnavailable,
    /// The stored token was rejected by the server (HTTP 401).
    Unauthorized,
    /// Transport failure or non-2xx response (other than 401).
    Network,
    /// Mobile token exchange returned non-2xx.
    ExchangeFailed,
    /// Deep-link JSON failed structural validation.
    MalformedPayload,
    /// The native store rejected a read or write.
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ModuleUnavailable => write!(f, "module_unavailable"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::ExchangeFailed => write!(f, "exchange_failed"),
            ErrorKind::MalformedPayload => write!(f, "malformed_payload"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}

/// Error with kind, display message, and optional HTTP context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HextokError {
    pub kind: ErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// HTTP status when the error came from a response
    pub status: Option<u16>,
    /// Raw response body or underlying cause
    pub details: Option<String>,
}

impl HextokError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// A native module is not registered.
    pub fn module_unavailable(module: &str) -> Self {
        Self::new(
            ErrorKind::ModuleUnavailable,
            format!("{module} not available"),
        )
    }

    pub fn unauthorized() -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: "HTTP 401: session rejected".to_string(),
            status: Some(401),
            details: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Non-2xx response from an authenticated endpoint.
    ///
    /// 401 maps to `Unauthorized`; everything else is `Network`.
    pub fn http_status(status: u16, body: &str) -> Self {
        if status == 401 {
            let mut err = Self::unauthorized();
            if !body.is_empty() {
                err.details = Some(body.to_string());
            }
            return err;
        }
        Self {
            kind: ErrorKind::Network,
            message: format!("HTTP {status}{}", server_message(body)),
            status: Some(status),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    pub fn exchange_failed(status: u16, body: &str) -> Self {
        Self {
            kind: ErrorKind::ExchangeFailed,
            message: format!("Token exchange failed (HTTP {status}){}", server_message(body)),
            status: Some(status),
            details: Some(body.to_string()),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedPayload, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }

    /// Only transient network failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    /// Message shown to the user for failed sign-in attempts.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::ExchangeFailed | ErrorKind::Unauthorized => {
                "Authentication failed. Please try again."
            }
            ErrorKind::Network => "Could not reach the server. Please try again.",
            ErrorKind::ModuleUnavailable | ErrorKind::Storage | ErrorKind::MalformedPayload => {
                "Something went wrong. Please try again."
            }
        }
    }
}

/// Extracts `message` or `error` from a JSON error body, if any.
fn server_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return String::new();
    };
    json.get("message")
        .or_else(|| json.get("error"))
        .and_then(Value::as_str)
        .map(|msg| format!(": {msg}"))
        .unwrap_or_default()
}

impl fmt::Display for HextokError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for HextokError {}

impl From<reqwest::Error> for HextokError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::network("Request timed out").with_details(err.to_string());
        }
        if err.is_decode() {
            return Self::network("Failed to decode response").with_details(err.to_string());
        }
        Self::network("Request failed").with_details(err.to_string())
    }
}

/// Result type for pipeline operations.
pub type HextokResult<T> = Result<T, HextokError>;
