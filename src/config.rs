//! Configuration constants and URL helpers for the Drive API.

use std::time::Duration;

/// Drive API v3 base URL.
pub const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Upload endpoint for Drive API v3 files.
pub const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Default OAuth 2.0 authorization endpoint.
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Default OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default OAuth scope: full Drive access.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Loopback redirect URI template. `{port}` is replaced with the
/// OS-assigned port at runtime.
pub const LOOPBACK_REDIRECT_TEMPLATE: &str = "http://127.0.0.1:{port}/";

/// Connect timeout for HTTP requests.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for non-upload requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Random bytes drawn for the anti-CSRF `state` nonce (base64url encoded).
pub const STATE_BYTE_LENGTH: usize = 32;

/// Random bytes drawn for the PKCE code verifier (base64url encoded; 64
/// bytes encode to 86 characters, within the 43..=128 range of RFC 7636).
pub const VERIFIER_BYTE_LENGTH: usize = 64;

/// Key names under which tokens are persisted in the key-value store.
///
/// Absence of a key means "no cached token", never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Key for the short-lived access token.
    pub access_token: String,
    /// Key for the long-lived refresh token.
    pub refresh_token: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "drive_access_token".to_string(),
            refresh_token: "drive_refresh_token".to_string(),
        }
    }
}

/// Returns the resumable upload initiation URL.
pub fn resumable_upload_url() -> String {
    format!("{}?uploadType=resumable", UPLOAD_BASE_URL)
}

/// Returns the metadata URL for a file resource.
pub fn file_url(file_id: &str) -> String {
    format!("{}/files/{}", API_BASE_URL, urlencoding::encode(file_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resumable_upload_url() {
        let url = resumable_upload_url();
        assert!(url.starts_with("https://www.googleapis.com/upload/"));
        assert!(url.contains("uploadType=resumable"));
    }

    #[test]
    fn test_file_url_encodes_id() {
        let url = file_url("abc/../etc");
        assert!(!url.contains("/../"));
        assert!(url.contains("%2F"));
    }

    #[test]
    fn test_default_storage_keys() {
        let keys = StorageKeys::default();
        assert_eq!(keys.access_token, "drive_access_token");
        assert_eq!(keys.refresh_token, "drive_refresh_token");
    }
}
