/*!
 * HTTP plumbing shared by the platform strategies.
 *
 * - `PlatformRequestDescriptor`: immutable description of one endpoint call
 * - `HttpClient`: the transport seam, implemented by `ReqwestHttpClient` and
 *   by test doubles
 */

use std::fmt::Debug;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method};
use reqwest::header::{COOKIE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::FetchError;
use crate::interceptor::{FetchPrimitive, FetchRequest, FetchResponse};

/// Credentials attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Plain request
    None,
    /// Access token travels inside the URL
    Token,
    /// Session cookies are forwarded
    CookieCredentialed,
}

/// Expected body of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// JSON envelope
    Json,
    /// HTML document
    Html,
    /// XML document
    Xml,
}

/// Immutable description of one network call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformRequestDescriptor {
    pub method: &'static str,
    /// URL with `{name}` placeholders; `{base}` is the configured endpoint root
    pub url_template: &'static str,
    pub auth: AuthMode,
    pub response: ResponseShape,
}

impl PlatformRequestDescriptor {
    pub const fn get(url_template: &'static str, auth: AuthMode, response: ResponseShape) -> Self {
        Self {
            method: "GET",
            url_template,
            auth,
            response,
        }
    }

    /// Substitute `{name}` placeholders.
    ///
    /// Values are inserted as-is; callers pass identifiers that need no escaping.
    pub fn render(&self, params: &[(&str, &str)]) -> String {
        params.iter().fold(self.url_template.to_string(), |url, (name, value)| {
            url.replace(&format!("{{{}}}", name), value)
        })
    }

    /// Send this call and return the body.
    ///
    /// A non-2xx status fails with `ApiError`, except for JSON endpoints whose
    /// error body is itself JSON: that envelope carries the platform's own
    /// code and message, so it is returned for the caller to inspect.
    pub async fn fetch_text(&self, client: &dyn HttpClient, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let url = self.render(params);
        let response = client.send(self.method, &url, self.auth).await?;

        if response.is_success() {
            return Ok(response.body);
        }

        warn!("{} responded with status {}", url, response.status);
        if self.response == ResponseShape::Json && serde_json::from_str::<Value>(&response.body).is_ok() {
            return Ok(response.body);
        }
        Err(response.into_error())
    }

    /// Send this call and decode the JSON body
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        client: &dyn HttpClient,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let body = self.fetch_text(client, params).await?;
        serde_json::from_str(&body).map_err(FetchError::from)
    }
}

/// Status and body of one completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `ApiError` carrying the status and at most 200 characters of body
    pub fn into_error(self) -> FetchError {
        let message = if self.body.chars().count() > 200 {
            self.body.chars().take(200).collect()
        } else {
            self.body
        };
        FetchError::ApiError {
            status_code: self.status,
            message,
        }
    }
}

/// Transport used by the orchestrator.
///
/// Every status is returned as a response; only transport failures are
/// errors. Implementations must not retry: every call is a single attempt.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    async fn send(&self, method: &str, url: &str, auth: AuthMode) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed client carrying optional session cookies
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    cookie: Option<String>,
    user_agent: Option<String>,
}

impl ReqwestHttpClient {
    /// Create a client without a request timeout
    pub fn new(cookie: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            cookie: cookie.filter(|c| !c.trim().is_empty()),
            user_agent: user_agent.filter(|ua| !ua.trim().is_empty()),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, method: &str, url: &str, auth: AuthMode) -> Result<HttpResponse, FetchError> {
        debug!("{} {} ({:?})", method, url, auth);

        let method = Method::from_bytes(method.as_bytes()).map_err(|e| FetchError::RequestFailed(e.to_string()))?;
        let mut request = self.client.request(method, url);
        if let Some(user_agent) = &self.user_agent {
            request = request.header(USER_AGENT, user_agent);
        }
        match auth {
            AuthMode::CookieCredentialed => match &self.cookie {
                Some(cookie) => request = request.header(COOKIE, cookie),
                None => debug!("No session cookie configured for credentialed request"),
            },
            // The token is already part of the URL; cookies stay off.
            AuthMode::Token | AuthMode::None => {}
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

// Page-style fetch: any status is a response, only transport failures error.
#[async_trait]
impl FetchPrimitive for ReqwestHttpClient {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(FetchResponse { status, body })
    }
}
