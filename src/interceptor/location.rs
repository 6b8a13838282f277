use std::sync::Arc;
use log::{debug, warn};
use parking_lot::RwLock;
use url::Url;

use super::{query_param, VIDEO_ID_PARAM};

// @module: Page location tracking

/// The page switched to a different video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    /// Video id seen before, if any
    pub previous: Option<String>,
    /// Newly seen video id
    pub current: String,
}

type NavigationCallback = Arc<dyn Fn(&NavigationEvent) + Send + Sync>;

/// Tracks the page URL and reports client-side navigation between videos
pub struct LocationWatcher {
    current_url: RwLock<Option<Url>>,
    last_video_id: RwLock<Option<String>>,
    callbacks: RwLock<Vec<NavigationCallback>>,
}

impl LocationWatcher {
    pub fn new(page_url: &str) -> Self {
        let current_url = parse_page_url(page_url);
        let last_video_id = current_url
            .as_ref()
            .and_then(|url| query_param(url, VIDEO_ID_PARAM));

        Self {
            current_url: RwLock::new(current_url),
            last_video_id: RwLock::new(last_video_id),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback fired when the video id changes.
    ///
    /// Callbacks registered during a navigation fire from the next one on.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    pub fn current_url(&self) -> Option<Url> {
        self.current_url.read().clone()
    }

    /// The `v` parameter of the current page URL
    pub fn current_video_id(&self) -> Option<String> {
        self.current_url
            .read()
            .as_ref()
            .and_then(|url| query_param(url, VIDEO_ID_PARAM))
    }

    /// Move the page to `page_url`.
    ///
    /// Callbacks fire only when a video id is present and differs from the last
    /// one seen; pages without an id keep the previous id.
    pub fn navigate(&self, page_url: &str) -> Option<NavigationEvent> {
        *self.current_url.write() = parse_page_url(page_url);

        let new_id = self.current_video_id()?;
        let event = {
            let mut last = self.last_video_id.write();
            if last.as_deref() == Some(new_id.as_str()) {
                return None;
            }
            let previous = last.replace(new_id.clone());
            NavigationEvent { previous, current: new_id }
        };

        debug!("Video changed: {:?} -> {}", event.previous, event.current);
        // Snapshot so callbacks may register further callbacks
        let callbacks: Vec<NavigationCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(&event);
        }

        Some(event)
    }
}

fn parse_page_url(page_url: &str) -> Option<Url> {
    match Url::parse(page_url) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Ignoring unparsable page URL '{}': {}", page_url, e);
            None
        }
    }
}
