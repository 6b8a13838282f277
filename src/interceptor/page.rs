use std::sync::Arc;
use log::{debug, info};

use super::{
    FetchPrimitive, FetchRequest, FetchResponse, LocationWatcher, ObservedFetch, ObservedXhr,
    PageRequestInterceptor, TokenLookup, XhrPrimitive,
};
use crate::bridge::RelaySender;
use crate::errors::FetchError;

// @module: Page execution context

/// The page side of the extension: its request primitives, its location and,
/// once installed, the interceptor sitting in front of both primitives.
pub struct PageContext {
    fetch: Arc<dyn FetchPrimitive>,
    xhr: Arc<dyn XhrPrimitive>,
    location: Arc<LocationWatcher>,
    interceptor: Option<Arc<PageRequestInterceptor>>,
}

impl PageContext {
    pub fn new(page_url: &str, fetch: Arc<dyn FetchPrimitive>, xhr: Arc<dyn XhrPrimitive>) -> Self {
        Self {
            fetch,
            xhr,
            location: Arc::new(LocationWatcher::new(page_url)),
            interceptor: None,
        }
    }

    /// Wrap both primitives with a new interceptor.
    ///
    /// Returns `false` without touching anything when already installed.
    pub fn install(&mut self, relay: Arc<dyn RelaySender>) -> bool {
        if self.interceptor.is_some() {
            debug!("Page interceptor already installed");
            return false;
        }

        let interceptor = Arc::new(PageRequestInterceptor::new(relay, Arc::clone(&self.location)));
        self.fetch = Arc::new(ObservedFetch::new(Arc::clone(&self.fetch), interceptor.clone()));
        self.xhr = Arc::new(ObservedXhr::new(Arc::clone(&self.xhr), interceptor.clone()));
        self.interceptor = Some(interceptor);

        info!("Page interceptor installed");
        true
    }

    pub fn is_installed(&self) -> bool {
        self.interceptor.is_some()
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetch.fetch(request).await
    }

    pub fn xhr_open(&self, method: &str, url: &str) {
        self.xhr.open(method, url);
    }

    pub fn location(&self) -> &Arc<LocationWatcher> {
        &self.location
    }

    pub fn interceptor(&self) -> Option<&Arc<PageRequestInterceptor>> {
        self.interceptor.as_ref()
    }

    /// Token captured for `video_id`, the `FisherAI_getPotParameter` accessor of
    /// the page scope
    pub fn get_pot_parameter(&self, video_id: &str) -> Option<String> {
        self.interceptor
            .as_ref()
            .and_then(|interceptor| interceptor.get_token(video_id))
    }
}
