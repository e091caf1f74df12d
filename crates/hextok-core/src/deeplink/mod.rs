//! Deep-link payloads and their ingestion.
//!
//! The native module hands over a JSON string describing the URL that opened
//! the app. [`DeepLinkPayload::from_json`] validates it the way the bridge
//! expects: `url` and `path` must be strings, `host`/`scheme` must be strings
//! when present, and query values are coerced to strings (or null).

pub mod router;
pub mod source;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use router::{DeepLinkRouter, MemoryNavigator, NavigateOptions, NavigationState, Navigator, RouteDecision};
pub use source::{DeepLinkSource, FileDeepLinkSource, MemoryDeepLinkSource};

use crate::error::{HextokError, HextokResult};

/// Host of OAuth callback links.
pub const OAUTH_CALLBACK_HOST: &str = "oauth";
/// Path of OAuth callback links.
pub const OAUTH_CALLBACK_PATH: &str = "/callback";

/// Structured description of a received deep link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLinkPayload {
    pub url: String,
    #[serde(default)]
    pub host: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, Option<String>>,
    /// Receive time, milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl DeepLinkPayload {
    /// Parses and validates a native JSON payload.
    ///
    /// # Errors
    /// Returns `MalformedPayload` when the JSON is invalid or a field has the
    /// wrong type.
    pub fn from_json(json: &str) -> HextokResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| HextokError::malformed("Deep link is not valid JSON").with_details(err.to_string()))?;
        Self::from_value(&value)
    }

    /// Validates an already-decoded payload.
    ///
    /// # Errors
    /// Returns `MalformedPayload` on structural problems.
    pub fn from_value(value: &Value) -> HextokResult<Self> {
        let Value::Object(obj) = value else {
            return Err(HextokError::malformed("Deep link payload is not an object"));
        };

        let required = |field: &str| -> HextokResult<String> {
            match obj.get(field) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Err(HextokError::malformed(format!(
                    "Deep link field `{field}` must be a string, got {}",
                    type_name(other)
                ))),
                None => Err(HextokError::malformed(format!("Deep link field `{field}` is missing"))),
            }
        };
        let optional = |field: &str| -> HextokResult<Option<String>> {
            match obj.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(HextokError::malformed(format!(
                    "Deep link field `{field}` must be a string, got {}",
                    type_name(other)
                ))),
            }
        };

        let url = required("url")?;
        let path = required("path")?;
        let host = optional("host")?.unwrap_or_default();
        let scheme = optional("scheme")?;

        let query_params = match obj.get("queryParams") {
            Some(Value::Object(params)) => params
                .iter()
                .map(|(k, v)| (k.clone(), coerce_query_value(v)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_f64)
            .filter(|ts| *ts > 0.0)
            .map_or_else(now_millis, |ts| ts as i64);

        Ok(Self {
            url,
            host,
            path,
            scheme,
            query_params,
            timestamp,
        })
    }

    /// Serializes to the bridge JSON shape.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns a query value, treating null as absent.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).and_then(Option::as_deref)
    }

    pub fn is_oauth_callback(&self) -> bool {
        self.host == OAUTH_CALLBACK_HOST && self.path == OAUTH_CALLBACK_PATH
    }
}

/// Builds a payload from a raw URL the way the native module does.
///
/// # Errors
/// Returns `MalformedPayload` when `raw` is not an absolute URL.
pub fn parse_url(raw: &str) -> HextokResult<DeepLinkPayload> {
    let url = url::Url::parse(raw.trim())
        .map_err(|err| HextokError::malformed(format!("Invalid deep link URL: {raw}")).with_details(err.to_string()))?;

    let path = match url.path() {
        "" => "/".to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{p}"),
    };

    let query_params = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Some(v.into_owned())))
        .collect();

    Ok(DeepLinkPayload {
        url: url.to_string(),
        host: url.host_str().unwrap_or_default().to_string(),
        path,
        scheme: Some(url.scheme().to_string()),
        query_params,
        timestamp: now_millis(),
    })
}

fn coerce_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
