/*!
 * Page request interception.
 *
 * The page's own scripts fetch caption tracks with a short-lived `pot` access
 * token in the query string. This module observes those requests without
 * altering them, keeps the latest token per video id and relays every new
 * observation through the token bridge.
 *
 * - `transport`: page network primitives and the observing decorators
 * - `location`: page URL tracking and navigation callbacks
 * - `page`: a page context that installs the interceptor once
 */

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::bridge::{BridgeMessage, RelaySender};
use crate::errors::InterceptError;

pub mod location;
pub mod page;
pub mod transport;

pub use location::{LocationWatcher, NavigationEvent};
pub use page::PageContext;
pub use transport::{FetchPrimitive, FetchRequest, FetchResponse, ObservedFetch, ObservedXhr, XhrPrimitive};

/// Substring identifying a caption-fetch request
pub const CAPTION_ENDPOINT_MARKER: &str = "timedtext";

/// Query parameter carrying the access token
pub const TOKEN_PARAM: &str = "pot";

/// Query parameter carrying the video id
pub const VIDEO_ID_PARAM: &str = "v";

/// A token observed on a caption request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedToken {
    /// Video id the token belongs to
    pub identifier: String,
    /// Value of the `pot` parameter
    pub token: String,
    /// Request URL the token was read from
    pub source_url: String,
    /// Observation time
    pub captured_at: DateTime<Utc>,
}

/// Synchronous token lookup by video id
pub trait TokenLookup: Send + Sync {
    fn get_token(&self, identifier: &str) -> Option<String>;
}

/// Hook run before a page request is handed to the real primitive.
///
/// Implementations must be invisible to the page: no panics, no errors, no
/// changes to the request.
pub trait NetworkObserver: Send + Sync {
    fn on_request_initiated(&self, url: &str);
}

/// Page-scoped token store, last write wins per id.
///
/// Entries are never evicted; they live as long as the page context.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    entries: Arc<RwLock<HashMap<String, InterceptedToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token, returning the entry it replaced
    pub fn insert(&self, token: InterceptedToken) -> Option<InterceptedToken> {
        self.entries.write().insert(token.identifier.clone(), token)
    }

    pub fn get(&self, identifier: &str) -> Option<InterceptedToken> {
        self.entries.read().get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries ordered by capture time
    pub fn snapshot(&self) -> Vec<InterceptedToken> {
        let mut tokens: Vec<InterceptedToken> = self.entries.read().values().cloned().collect();
        tokens.sort_by(|a, b| a.captured_at.cmp(&b.captured_at));
        tokens
    }
}

impl TokenLookup for TokenStore {
    fn get_token(&self, identifier: &str) -> Option<String> {
        self.entries.read().get(identifier).map(|entry| entry.token.clone())
    }
}

/// Observes caption requests and captures their tokens
pub struct PageRequestInterceptor {
    store: TokenStore,
    relay: Arc<dyn RelaySender>,
    location: Arc<LocationWatcher>,
}

impl PageRequestInterceptor {
    /// Create an interceptor bound to a page location.
    ///
    /// Registers a navigation callback that keeps every stored token.
    pub fn new(relay: Arc<dyn RelaySender>, location: Arc<LocationWatcher>) -> Self {
        let store = TokenStore::new();

        let retained = store.clone();
        location.on_change(move |event| {
            info!(
                "Navigated to video {} (from {}), keeping {} captured token(s)",
                event.current,
                event.previous.as_deref().unwrap_or("none"),
                retained.len()
            );
        });

        Self { store, relay, location }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn location(&self) -> &Arc<LocationWatcher> {
        &self.location
    }

    /// Inspect one request URL.
    ///
    /// Returns the stored token when the URL is a caption request carrying a
    /// token and a video id can be determined, `None` otherwise.
    pub fn inspect(&self, url: &str) -> Result<Option<InterceptedToken>, InterceptError> {
        if !url.contains(CAPTION_ENDPOINT_MARKER) {
            return Ok(None);
        }

        let parsed = self.resolve(url)?;
        let Some(token) = query_param(&parsed, TOKEN_PARAM) else {
            return Ok(None);
        };

        let identifier = match query_param(&parsed, VIDEO_ID_PARAM) {
            Some(identifier) => identifier,
            None => match self.location.current_video_id() {
                Some(identifier) => {
                    debug!("Caption request without video id, using page video {}", identifier);
                    identifier
                }
                None => {
                    debug!("Dropping token from {}: no video id available", url);
                    return Ok(None);
                }
            },
        };

        let intercepted = InterceptedToken {
            identifier,
            token,
            source_url: url.to_string(),
            captured_at: Utc::now(),
        };

        self.store.insert(intercepted.clone());
        self.relay.post(BridgeMessage::pot_intercepted(&intercepted));
        debug!("Captured token for video {}", intercepted.identifier);

        Ok(Some(intercepted))
    }

    // Relative URLs resolve against the current page, like the browser does.
    fn resolve(&self, url: &str) -> Result<Url, InterceptError> {
        let base = self.location.current_url();
        Url::options()
            .base_url(base.as_ref())
            .parse(url)
            .map_err(|e| InterceptError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

impl NetworkObserver for PageRequestInterceptor {
    fn on_request_initiated(&self, url: &str) {
        if let Err(e) = self.inspect(url) {
            error!("{}", e);
        }
    }
}

impl TokenLookup for PageRequestInterceptor {
    fn get_token(&self, identifier: &str) -> Option<String> {
        self.store.get_token(identifier)
    }
}

/// First non-empty value of a query parameter
pub(crate) fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
