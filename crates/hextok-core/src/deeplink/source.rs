//! Deep-link source contract and two local implementations.
//!
//! `MemoryDeepLinkSource` mirrors the native module's behavior in-process:
//! the launch link is returned by `get_initial_deep_link` once, the most
//! recent link stays available through `get_last_deep_link` until cleared,
//! and runtime arrivals are broadcast to subscribers.
//!
//! `FileDeepLinkSource` keeps the last link as JSON on disk so separate CLI
//! invocations can hand links to each other.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{DeepLinkPayload, parse_url};
use crate::error::{HextokError, HextokResult};

const CHANNEL_CAPACITY: usize = 16;

#[async_trait]
pub trait DeepLinkSource: Send + Sync {
    /// The link that launched the app. Returned at most once.
    async fn get_initial_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>>;

    /// The most recently received link, until cleared.
    async fn get_last_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>>;

    /// Runtime arrivals. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<DeepLinkPayload>;

    async fn clear_deep_link(&self) -> HextokResult<()>;

    async fn has_deep_link(&self) -> HextokResult<bool>;

    /// Whether links with this scheme are routed to the app.
    fn can_handle_scheme(&self, _scheme: &str) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    initial: Option<DeepLinkPayload>,
    last: Option<DeepLinkPayload>,
}

/// In-process source.
#[derive(Debug)]
pub struct MemoryDeepLinkSource {
    scheme: String,
    state: Mutex<MemoryState>,
    events: broadcast::Sender<DeepLinkPayload>,
    last_reads: AtomicUsize,
}

impl MemoryDeepLinkSource {
    pub fn new(scheme: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            scheme: scheme.into(),
            state: Mutex::new(MemoryState::default()),
            events,
            last_reads: AtomicUsize::new(0),
        }
    }

    /// Sets the launch link. It also becomes the last link.
    #[must_use]
    pub fn with_initial(self, payload: DeepLinkPayload) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.last = Some(payload.clone());
            state.initial = Some(payload);
        }
        self
    }

    /// Records a runtime link and notifies subscribers.
    pub fn deliver(&self, payload: DeepLinkPayload) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last = Some(payload.clone());
        // No receivers is fine; the link stays readable via get_last.
        let _ = self.events.send(payload);
    }

    /// Parses `url` and delivers it as if the OS had opened it.
    ///
    /// # Errors
    /// Returns `MalformedPayload` for an invalid URL.
    pub fn simulate(&self, url: &str) -> HextokResult<DeepLinkPayload> {
        let payload = parse_url(url)?;
        tracing::debug!(url, "Simulating deep link");
        self.deliver(payload.clone());
        Ok(payload)
    }

    /// Number of `get_last_deep_link` calls so far.
    pub fn last_reads(&self) -> usize {
        self.last_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeepLinkSource for MemoryDeepLinkSource {
    async fn get_initial_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .initial
            .take())
    }

    async fn get_last_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>> {
        self.last_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeepLinkPayload> {
        self.events.subscribe()
    }

    async fn clear_deep_link(&self) -> HextokResult<()> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last = None;
        Ok(())
    }

    async fn has_deep_link(&self) -> HextokResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .is_some())
    }

    fn can_handle_scheme(&self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(&self.scheme)
    }
}

/// Source backed by a JSON file holding the last payload.
#[derive(Debug)]
pub struct FileDeepLinkSource {
    path: PathBuf,
    scheme: String,
    initial_consumed: AtomicBool,
    events: broadcast::Sender<DeepLinkPayload>,
}

impl FileDeepLinkSource {
    pub fn new(path: impl Into<PathBuf>, scheme: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            scheme: scheme.into(),
            initial_consumed: AtomicBool::new(false),
            events,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Writes `payload` as the last link and notifies in-process subscribers.
    ///
    /// # Errors
    /// Returns `Storage` if the file cannot be written.
    pub fn deliver(&self, payload: &DeepLinkPayload) -> HextokResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                HextokError::storage(format!("Failed to create {}", parent.display()))
                    .with_details(err.to_string())
            })?;
        }
        fs::write(&self.path, payload.to_json()).map_err(|err| {
            HextokError::storage(format!("Failed to write {}", self.path.display()))
                .with_details(err.to_string())
        })?;
        let _ = self.events.send(payload.clone());
        Ok(())
    }

    /// Parses `url` and stores it as the last link.
    ///
    /// # Errors
    /// Returns `MalformedPayload` for an invalid URL, `Storage` on write failure.
    pub fn simulate(&self, url: &str) -> HextokResult<DeepLinkPayload> {
        let payload = parse_url(url)?;
        self.deliver(&payload)?;
        Ok(payload)
    }

    fn read(&self) -> HextokResult<Option<DeepLinkPayload>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            HextokError::storage(format!("Failed to read {}", self.path.display()))
                .with_details(err.to_string())
        })?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        DeepLinkPayload::from_json(&contents).map(Some)
    }
}

#[async_trait]
impl DeepLinkSource for FileDeepLinkSource {
    async fn get_initial_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>> {
        if self.initial_consumed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.read()
    }

    async fn get_last_deep_link(&self) -> HextokResult<Option<DeepLinkPayload>> {
        self.read()
    }

    fn subscribe(&self) -> broadcast::Receiver<DeepLinkPayload> {
        self.events.subscribe()
    }

    async fn clear_deep_link(&self) -> HextokResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(
                HextokError::storage(format!("Failed to remove {}", self.path.display()))
                    .with_details(err.to_string()),
            ),
        }
    }

    async fn has_deep_link(&self) -> HextokResult<bool> {
        Ok(self.path.exists())
    }

    fn can_handle_scheme(&self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(&self.scheme)
    }
}
