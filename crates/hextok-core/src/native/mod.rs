//! Native device capabilities.
//!
//! Every native module is a trait object behind an `Option`. The composition
//! root resolves them once into a [`Capabilities`] value and passes it down;
//! nothing in the crate looks modules up on its own.

pub mod browser;
pub mod files;
pub mod storage;

use std::fmt;
use std::sync::Arc;

pub use browser::{AuthSessionOptions, AuthSessionResult, WebBrowser};
pub use files::{FileDescriptor, FilePermission, FilePicker, PickerOptions};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

use crate::deeplink::DeepLinkSource;
use crate::error::{HextokError, HextokResult};

/// Resolved native modules.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub storage: Option<Arc<dyn KeyValueStore>>,
    pub deep_links: Option<Arc<dyn DeepLinkSource>>,
    pub browser: Option<Arc<dyn WebBrowser>>,
    pub file_picker: Option<Arc<dyn FilePicker>>,
    pub file_permission: Option<Arc<dyn FilePermission>>,
}

impl Capabilities {
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_deep_links(mut self, source: Arc<dyn DeepLinkSource>) -> Self {
        self.deep_links = Some(source);
        self
    }

    #[must_use]
    pub fn with_browser(mut self, browser: Arc<dyn WebBrowser>) -> Self {
        self.browser = Some(browser);
        self
    }

    #[must_use]
    pub fn with_file_picker(mut self, picker: Arc<dyn FilePicker>) -> Self {
        self.file_picker = Some(picker);
        self
    }

    #[must_use]
    pub fn with_file_permission(mut self, permission: Arc<dyn FilePermission>) -> Self {
        self.file_permission = Some(permission);
        self
    }

    /// Returns the handle or `ModuleUnavailable` naming the module.
    ///
    /// # Errors
    /// Returns `ModuleUnavailable` when `handle` is `None`.
    pub fn require<T: ?Sized>(handle: Option<&Arc<T>>, module: &str) -> HextokResult<Arc<T>> {
        handle
            .map(Arc::clone)
            .ok_or_else(|| HextokError::module_unavailable(module))
    }

    /// # Errors
    /// `ModuleUnavailable` when no KeyValueStore is registered.
    pub fn storage(&self) -> HextokResult<Arc<dyn KeyValueStore>> {
        Self::require(self.storage.as_ref(), "KeyValueStore")
    }

    /// # Errors
    /// `ModuleUnavailable` when no DeepLinkSource is registered.
    pub fn deep_links(&self) -> HextokResult<Arc<dyn DeepLinkSource>> {
        Self::require(self.deep_links.as_ref(), "DeepLinkSource")
    }

    /// # Errors
    /// `ModuleUnavailable` when no WebBrowser is registered.
    pub fn browser(&self) -> HextokResult<Arc<dyn WebBrowser>> {
        Self::require(self.browser.as_ref(), "WebBrowser")
    }

    /// `(module, available)` pairs in a fixed order.
    pub fn describe(&self) -> [(&'static str, bool); 5] {
        [
            ("KeyValueStore", self.storage.is_some()),
            ("DeepLinkSource", self.deep_links.is_some()),
            ("WebBrowser", self.browser.is_some()),
            ("FilePicker", self.file_picker.is_some()),
            ("FilePermission", self.file_permission.is_some()),
        ]
    }

    pub fn log_availability(&self) {
        for (module, available) in self.describe() {
            tracing::debug!(module, available, "Native module");
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Capabilities");
        for (module, available) in self.describe() {
            s.field(module, &available);
        }
        s.finish()
    }
}
