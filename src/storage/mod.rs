//! Token persistence backends.
//!
//! Provides the [`KeyValueStore`] trait and implementations:
//! - [`FileStore`] - JSON file with 0600 permissions
//! - [`MemoryStore`] - In-memory (testing)
//! - [`KeyringStore`] - System keyring (feature-gated)
//!
//! The store is an external collaborator: the library only ever reads and
//! writes two named entries (access token, refresh token) whose key names
//! come from [`StorageKeys`]. A missing key means "no cached token".

mod file;
mod memory;

#[cfg(feature = "system-keyring")]
mod keyring;

use std::sync::Arc;

use async_trait::async_trait;

pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(feature = "system-keyring")]
pub use self::keyring::KeyringStore;

use crate::config::StorageKeys;
use crate::error::Result;
use crate::oauth::token::TokenState;

/// Trait for persistent key-value backends holding token material.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`. Removing a missing key is not
    /// an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Name of this storage backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }
    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Binds a [`KeyValueStore`] to the configured token key names.
///
/// All token reads and writes in the library go through this wrapper so the
/// two entries are always kept consistent.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl TokenCache {
    /// Create a cache over the given backend and key names.
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    /// Load the cached token state. `None` when no access token is cached.
    pub async fn load(&self) -> Result<Option<TokenState>> {
        let access = self.store.get(&self.keys.access_token).await?;
        let Some(access_token) = access.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let refresh_token = self
            .store
            .get(&self.keys.refresh_token)
            .await?
            .filter(|t| !t.is_empty());
        Ok(Some(TokenState {
            access_token,
            refresh_token,
        }))
    }

    /// Persist a token state. A state without a refresh token leaves any
    /// previously cached refresh token in place (some servers only issue a
    /// refresh token on the first consent).
    pub async fn save(&self, state: &TokenState) -> Result<()> {
        self.store
            .set(&self.keys.access_token, &state.access_token)
            .await?;
        if let Some(refresh) = state.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.store.set(&self.keys.refresh_token, refresh).await?;
        }
        Ok(())
    }

    /// Remove both entries (logout).
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(&self.keys.access_token).await?;
        self.store.remove(&self.keys.refresh_token).await?;
        Ok(())
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.store.name()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("backend", &self.store.name())
            .field("keys", &self.keys)
            .finish()
    }
}
