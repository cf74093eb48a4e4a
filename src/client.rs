//! High-level Drive client.
//!
//! [`DriveClient`] wires the pieces together: credentials, token storage,
//! an acquisition strategy, and the authorized transport. Construction goes
//! through [`DriveClientBuilder`]; everything except the credentials has a
//! sensible default.
//!
//! ```no_run
//! use drive_gateway::{ClientCredentials, DriveClient};
//!
//! # async fn demo() -> drive_gateway::Result<()> {
//! let client = DriveClient::builder()
//!     .credentials(ClientCredentials::installed("my-client-id"))
//!     .build()?;
//! client.authorize().await?;
//! let file = client.get_file("1a2b3c").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::AuthController;
use crate::config::{self, StorageKeys, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::oauth::provider::{
    select_provider, AccessTokenProvider, LoopbackProvider, PlatformCapabilities, UserAgentLauncher,
};
use crate::oauth::ClientCredentials;
use crate::storage::{FileStore, KeyValueStore, TokenCache};
use crate::transport::{ApiRequest, AuthorizedClient, RawResponse, RequestDispatcher};
use crate::upload::ResumableUpload;

/// Configured client for the Drive API.
#[derive(Clone)]
pub struct DriveClient {
    auth: Arc<AuthController>,
    transport: AuthorizedClient,
}

impl DriveClient {
    /// Start building a client.
    pub fn builder() -> DriveClientBuilder {
        DriveClientBuilder::default()
    }

    /// The auth controller, for callers that manage authorization directly.
    pub fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    /// Ensure a usable token exists, interacting with the user if needed.
    /// Joins any authorization already in flight.
    pub async fn authorize(&self) -> Result<()> {
        self.auth.refresh_access_token().await.map(|_| ())
    }

    /// Cancel an in-flight authorization attempt.
    pub fn cancel_authorization(&self) {
        self.auth.cancel_auth();
    }

    /// Whether a token is cached.
    pub async fn is_authorized(&self) -> Result<bool> {
        self.auth.is_authorized().await
    }

    /// Drop all cached token material.
    pub async fn logout(&self) -> Result<()> {
        self.auth.clear().await
    }

    /// Execute a request, with automatic refresh-and-resend on `401`.
    pub async fn request(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.transport.execute(request).await
    }

    /// Execute a request and deserialize its JSON body.
    pub async fn request_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.transport.execute_json(request).await
    }

    /// Wrap a request in an abortable, idempotent dispatcher.
    pub fn dispatcher<T>(&self, request: ApiRequest) -> RequestDispatcher<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        RequestDispatcher::new(self.transport.clone(), request)
    }

    /// Fetch a file's metadata resource.
    pub async fn get_file(&self, file_id: &str) -> Result<serde_json::Value> {
        self.request_json(&ApiRequest::get(config::file_url(file_id)))
            .await
    }

    /// Start a resumable upload for the given file metadata.
    pub fn upload(&self, metadata: serde_json::Value) -> ResumableUpload {
        ResumableUpload::new(self.transport.clone(), metadata)
    }

    /// Resume an upload against a previously issued session URI.
    pub fn resume_upload(&self, session_uri: impl Into<String>) -> ResumableUpload {
        ResumableUpload::resume(self.transport.clone(), session_uri)
    }
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient").field("auth", &self.auth).finish()
    }
}

/// Builder for [`DriveClient`].
#[derive(Default)]
pub struct DriveClientBuilder {
    credentials: Option<ClientCredentials>,
    scope: Option<String>,
    store: Option<Arc<dyn KeyValueStore>>,
    keys: Option<StorageKeys>,
    launcher: Option<Arc<dyn UserAgentLauncher>>,
    provider: Option<Arc<dyn AccessTokenProvider>>,
    capabilities: Option<PlatformCapabilities>,
    http: Option<reqwest::Client>,
}

impl DriveClientBuilder {
    /// OAuth client credentials. Required unless a custom provider is set.
    pub fn credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// OAuth scope to request. Defaults to full Drive access.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Token storage backend. Defaults to a JSON file in the user's
    /// config directory.
    pub fn storage(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Key names for the stored tokens.
    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Browser launcher for the interactive flow.
    pub fn launcher(mut self, launcher: Arc<dyn UserAgentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Replace the acquisition strategy entirely.
    pub fn provider(mut self, provider: Arc<dyn AccessTokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Platform capabilities used for strategy selection. Defaults to a
    /// desktop environment.
    pub fn capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// A caller-configured `reqwest::Client`.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Assemble the client.
    pub fn build(self) -> Result<DriveClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client build"),
        };

        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::default_path()?),
        };
        let cache = TokenCache::new(store, self.keys.unwrap_or_default());

        let scope = self
            .scope
            .unwrap_or_else(|| config::DEFAULT_SCOPE.to_string());

        let provider: Arc<dyn AccessTokenProvider> = match self.provider {
            Some(provider) => provider,
            None => {
                let credentials = self.credentials.ok_or_else(|| {
                    Error::Config("client credentials are required".into())
                })?;
                match self.launcher {
                    Some(launcher) => Arc::new(
                        LoopbackProvider::new(http.clone(), credentials, scope, cache.clone())
                            .with_launcher(launcher),
                    ),
                    None => select_provider(
                        http.clone(),
                        credentials,
                        &scope,
                        cache.clone(),
                        &self.capabilities.unwrap_or_else(PlatformCapabilities::desktop),
                    )?,
                }
            }
        };

        let auth = Arc::new(AuthController::new(cache, provider));
        let transport = AuthorizedClient::with_client(http, auth.clone());
        Ok(DriveClient { auth, transport })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_build_requires_credentials_or_provider() {
        let result = DriveClient::builder()
            .storage(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_build_with_credentials() {
        let client = DriveClient::builder()
            .credentials(ClientCredentials::installed("c1"))
            .storage(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        assert_eq!(client.auth().storage_backend(), "memory");
    }

    #[tokio::test]
    async fn test_build_with_custom_provider() {
        use crate::oauth::RedirectProvider;

        let client = DriveClient::builder()
            .provider(Arc::new(RedirectProvider::from_redirect_url(
                "http://app/#access_token=t9",
            )))
            .storage(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        client.authorize().await.unwrap();
        assert!(client.is_authorized().await.unwrap());
        client.logout().await.unwrap();
        assert!(!client.is_authorized().await.unwrap());
    }
}
