//! File picker and storage permission capabilities.
//!
//! The helpers here collapse module failures to safe defaults: a missing
//! picker yields `None`, a failed permission check yields `None`/`false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Capabilities;
use crate::error::HextokResult;

/// A file returned by the picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub uri: String,
    pub name: String,
    /// Content, when requested with `include_base64`.
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickerOptions {
    pub multiple: bool,
    /// MIME types, e.g. `image/*`. Empty accepts anything.
    pub accepts: Vec<String>,
    pub include_base64: bool,
}

#[async_trait]
pub trait FilePicker: Send + Sync {
    /// Shows the picker. An empty list means the user cancelled.
    async fn open(&self, options: &PickerOptions) -> HextokResult<Vec<FileDescriptor>>;
}

#[async_trait]
pub trait FilePermission: Send + Sync {
    async fn has_permission(&self) -> HextokResult<bool>;
    /// Prompts the user. Returns whether access was granted.
    async fn request_permission(&self) -> HextokResult<bool>;
}

/// Opens the picker when available.
///
/// Returns `None` when the module is missing or failed, `Some(vec![])` when
/// the user cancelled.
pub async fn pick_files(caps: &Capabilities, options: &PickerOptions) -> Option<Vec<FileDescriptor>> {
    let picker = caps.file_picker.as_ref()?;
    match picker.open(options).await {
        Ok(files) => Some(files),
        Err(err) => {
            tracing::warn!(error = %err, "File picker failed");
            None
        }
    }
}

/// `None` when the permission module is missing or the check failed.
pub async fn check_file_permission(caps: &Capabilities) -> Option<bool> {
    let module = caps.file_permission.as_ref()?;
    module
        .has_permission()
        .await
        .inspect_err(|err| tracing::warn!(error = %err, "Permission check failed"))
        .ok()
}

/// Requests access, treating any failure as denied.
pub async fn request_file_permission(caps: &Capabilities) -> bool {
    let Some(module) = caps.file_permission.as_ref() else {
        tracing::debug!("File permission module not available");
        return false;
    };
    if matches!(module.has_permission().await, Ok(true)) {
        return true;
    }
    match module.request_permission().await {
        Ok(granted) => granted,
        Err(err) => {
            tracing::warn!(error = %err, "Permission request failed");
            false
        }
    }
}
