//! Composition root: file-backed native modules under `HEXTOK_HOME`.

use std::sync::Arc;

use anyhow::{Context, Result};
use hextok_core::config::{Config, paths};
use hextok_core::deeplink::{DeepLinkSource, FileDeepLinkSource};
use hextok_core::native::{Capabilities, FileStore, KeyValueStore, WebBrowser};
use hextok_core::{AppBootstrap, AuthManager};

use super::browser::SystemBrowser;

pub struct App {
    pub config: Config,
    pub source: Arc<FileDeepLinkSource>,
    pub capabilities: Capabilities,
    pub auth: Arc<AuthManager>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(paths::storage_path()));
        let source = Arc::new(FileDeepLinkSource::new(paths::deep_link_path(), &config.scheme));
        let browser: Arc<dyn WebBrowser> = Arc::new(SystemBrowser);

        let capabilities = Capabilities::default()
            .with_storage(Arc::clone(&store))
            .with_deep_links(Arc::clone(&source) as Arc<dyn DeepLinkSource>)
            .with_browser(browser);
        capabilities.log_availability();

        let auth = AuthManager::from_config(config, capabilities.storage()?).context("create auth manager")?;

        Ok(Self {
            config: config.clone(),
            source,
            capabilities,
            auth: Arc::new(auth),
        })
    }

    pub fn bootstrap(&self) -> Result<AppBootstrap> {
        AppBootstrap::from_capabilities(&self.config, &self.capabilities, Arc::clone(&self.auth))
            .context("create bootstrap")
    }
}
