//! File-based token storage with secure permissions.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// File-based key-value storage using a JSON map with 0600 permissions.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create storage at the specified path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create storage at the default path:
    /// `<config dir>/drive-gateway/tokens.json`.
    pub fn default_path() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine config directory".into()))?;
        Ok(Self::new(config_dir.join("drive-gateway").join("tokens.json")))
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("{}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| Error::Storage(e.to_string()))
    }

    fn write_all(&self, data: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("{}: {}", parent.display(), e)))?;
        }

        let content =
            serde_json::to_string_pretty(data).map_err(|e| Error::Storage(e.to_string()))?;
        std::fs::write(&self.path, &content)
            .map_err(|e| Error::Storage(format!("{}: {}", self.path.display(), e)))?;

        // Set 0600 permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)
                .map_err(|e| Error::Storage(format!("chmod {}: {}", self.path.display(), e)))?;
        }

        debug!(path = %self.path.display(), "Tokens saved");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.read_all()?;
        data.insert(key.to_string(), value.to_string());
        self.write_all(&data)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.read_all()?;
        data.remove(key);
        self.write_all(&data)
    }

    fn name(&self) -> &str {
        "file"
    }
}
