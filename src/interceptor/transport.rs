/*!
 * Page network primitives and the decorators that observe them.
 *
 * A page issues requests through a promise-style `fetch` and an event-style
 * `XMLHttpRequest.open`. `ObservedFetch` and `ObservedXhr` sit in front of the
 * real primitives: they show the URL to a `NetworkObserver` and then always
 * delegate with the untouched arguments.
 */

use std::fmt::Debug;
use std::sync::Arc;
use async_trait::async_trait;

use super::NetworkObserver;
use crate::errors::FetchError;

/// Request handed to a fetch-style primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    /// Plain GET without headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response of a fetch-style primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Promise-style request primitive
#[async_trait]
pub trait FetchPrimitive: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Event-style request primitive; `open` only records the target
pub trait XhrPrimitive: Send + Sync {
    fn open(&self, method: &str, url: &str);
}

/// Fetch primitive that reports every URL to an observer first
pub struct ObservedFetch {
    inner: Arc<dyn FetchPrimitive>,
    observer: Arc<dyn NetworkObserver>,
}

impl ObservedFetch {
    pub fn new(inner: Arc<dyn FetchPrimitive>, observer: Arc<dyn NetworkObserver>) -> Self {
        Self { inner, observer }
    }
}

#[async_trait]
impl FetchPrimitive for ObservedFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.observer.on_request_initiated(&request.url);
        self.inner.fetch(request).await
    }
}

/// XHR primitive that reports every URL to an observer first
pub struct ObservedXhr {
    inner: Arc<dyn XhrPrimitive>,
    observer: Arc<dyn NetworkObserver>,
}

impl ObservedXhr {
    pub fn new(inner: Arc<dyn XhrPrimitive>, observer: Arc<dyn NetworkObserver>) -> Self {
        Self { inner, observer }
    }
}

impl XhrPrimitive for ObservedXhr {
    fn open(&self, method: &str, url: &str) {
        self.observer.on_request_initiated(url);
        self.inner.open(method, url);
    }
}

impl Debug for ObservedFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedFetch").finish_non_exhaustive()
    }
}

impl Debug for ObservedXhr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedXhr").finish_non_exhaustive()
    }
}
