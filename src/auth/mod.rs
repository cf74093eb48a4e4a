//! Authorization state and coalesced token refresh.
//!
//! [`AuthController`] owns the cached token state and funnels every refresh
//! through a single in-flight future: when several requests hit an expired
//! token at once, the first caller starts the refresh and every later caller
//! awaits the same shared future and receives the same outcome. A refresh
//! that requires user interaction therefore prompts once, not once per
//! pending request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::oauth::provider::AccessTokenProvider;
use crate::storage::TokenCache;

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Owns token state and serializes refresh attempts.
pub struct AuthController {
    cache: TokenCache,
    provider: Arc<dyn AccessTokenProvider>,
    /// The one in-flight refresh, tagged with its generation so a finished
    /// attempt only clears its own slot.
    in_flight: Mutex<Option<(u64, SharedRefresh)>>,
    generation: AtomicU64,
    cancel: Arc<Notify>,
}

impl AuthController {
    /// Create a controller over the given cache and acquisition strategy.
    pub fn new(cache: TokenCache, provider: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            cache,
            provider,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// The cached access token, if any. Never triggers a refresh.
    pub async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.cache.load().await?.map(|s| s.access_token))
    }

    /// Whether a token is cached.
    pub async fn is_authorized(&self) -> Result<bool> {
        Ok(self.cache.load().await?.is_some())
    }

    /// Obtain a fresh access token, coalescing with any refresh already in
    /// flight. The new state is persisted before the token is returned.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let (generation, fut) = {
            let mut slot = self.in_flight.lock().expect("refresh slot poisoned");
            match slot.as_ref() {
                Some((generation, fut)) => {
                    debug!("Joining in-flight token refresh");
                    (*generation, fut.clone())
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let provider = self.provider.clone();
                    let cache = self.cache.clone();
                    let cancel = self.cancel.clone();
                    info!(strategy = provider.name(), "Starting token refresh");
                    let fut: SharedRefresh = async move {
                        let state = tokio::select! {
                            result = provider.provide_access_token() => result?,
                            _ = cancel.notified() => return Err(Error::Aborted),
                        };
                        cache.save(&state).await?;
                        Ok(state.access_token)
                    }
                    .boxed()
                    .shared();
                    *slot = Some((generation, fut.clone()));
                    (generation, fut)
                }
            }
        };

        let result = fut.await;

        {
            let mut slot = self.in_flight.lock().expect("refresh slot poisoned");
            if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
                *slot = None;
            }
        }

        result
    }

    /// Cancel the in-flight authorization attempt, if any. Every waiter on
    /// the shared refresh observes [`Error::Aborted`].
    pub fn cancel_auth(&self) {
        debug!("Cancelling in-flight authorization");
        self.cancel.notify_waiters();
    }

    /// Drop all cached token material (logout).
    pub async fn clear(&self) -> Result<()> {
        self.cache.clear().await
    }

    /// Name of the underlying storage backend.
    pub fn storage_backend(&self) -> &str {
        self.cache.backend_name()
    }
}

impl std::fmt::Debug for AuthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("cache", &self.cache)
            .field("strategy", &self.provider.name())
            .finish()
    }
}
