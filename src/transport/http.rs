//! Authorized HTTP execution with automatic token refresh.
//!
//! [`AuthorizedClient`] owns the `reqwest` client and the auth controller.
//! Every request is sent with the cached bearer token; a `401` triggers one
//! coalesced refresh and one resend. A second `401` after a completed
//! refresh is terminal ([`Error::RefreshExhausted`]) so a revoked grant can
//! never loop.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::AuthController;
use crate::config::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::{Error, Result};

/// A rebuildable description of one API request.
///
/// Kept as plain data (not a `reqwest::RequestBuilder`) so the request can
/// be rebuilt for the post-refresh resend and cloned into a dispatcher.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status, headers and raw body of an API response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client that attaches bearer tokens and recovers from expiry.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    auth: Arc<AuthController>,
}

impl AuthorizedClient {
    /// Create a client with the default timeouts.
    pub fn new(auth: Arc<AuthController>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Self { http, auth }
    }

    /// Create a client over a caller-configured `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, auth: Arc<AuthController>) -> Self {
        Self { http, auth }
    }

    /// The auth controller backing this client.
    pub fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    /// The underlying `reqwest` client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Execute a request, refreshing and resending once on `401`.
    pub async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let token = match self.auth.access_token().await? {
            Some(token) => token,
            // No cached token yet: acquire one before the first attempt.
            None => self.auth.refresh_access_token().await?,
        };

        let response = self.attempt(request, &token).await?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!(url = %request.url, "Unauthorized; refreshing token and resending");
        let token = self.auth.refresh_access_token().await?;
        let response = self.attempt(request, &token).await?;
        if response.status == 401 {
            warn!(url = %request.url, "Still unauthorized after refresh");
            return Err(Error::RefreshExhausted);
        }
        Ok(response)
    }

    /// Execute a request and deserialize a 2xx JSON body.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(Error::Api {
                status: response.status,
                message: response.text(),
            });
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::Transport(format!("invalid JSON response: {e}")))
    }

    /// One send with a concrete bearer token.
    async fn attempt(&self, request: &ApiRequest, token: &str) -> Result<RawResponse> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .bearer_auth(token);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
