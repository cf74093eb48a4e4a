//! OAuth client credentials.
//!
//! [`ClientCredentials`] is an immutable value describing one OAuth client:
//! id, optional secret and the endpoints it talks to. Two variants exist in
//! the wild and both map onto the same capability set:
//!
//! - **Web application** credentials carry a client secret.
//! - **Installed application** credentials (reversed-client-id style) have
//!   no secret; PKCE stands in for it.
//!
//! The standard client-secrets JSON (`{"installed": {...}}` or
//! `{"web": {...}}`) can be parsed directly.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_AUTH_URI, DEFAULT_TOKEN_URI, LOOPBACK_REDIRECT_TEMPLATE};
use crate::error::{Error, Result};

/// Immutable OAuth client description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCredentials {
    /// OAuth client identifier.
    pub client_id: String,

    /// Client secret; absent for installed-application clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Authorization endpoint URI.
    #[serde(rename = "auth_uri")]
    pub auth_uri: String,

    /// Token endpoint URI.
    #[serde(rename = "token_uri")]
    pub token_uri: String,

    /// Redirect URI template; `{port}` is replaced with the loopback
    /// listener's OS-assigned port.
    #[serde(default = "default_redirect_template")]
    pub redirect_uri_template: String,
}

fn default_redirect_template() -> String {
    LOOPBACK_REDIRECT_TEMPLATE.to_string()
}

/// Wrapper matching the standard client-secrets JSON file layout.
#[derive(Debug, Deserialize)]
enum CredentialsFile {
    #[serde(rename = "installed")]
    Installed(ClientCredentials),
    #[serde(rename = "web")]
    Web(ClientCredentials),
}

impl ClientCredentials {
    /// Create installed-application credentials (no client secret).
    pub fn installed(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            redirect_uri_template: LOOPBACK_REDIRECT_TEMPLATE.to_string(),
        }
    }

    /// Create web-application credentials (client secret required by the
    /// token endpoint even when PKCE is used).
    pub fn web(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_secret: Some(client_secret.into()),
            ..Self::installed(client_id)
        }
    }

    /// Override the authorization and token endpoints.
    pub fn with_endpoints(
        mut self,
        auth_uri: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        self.auth_uri = auth_uri.into();
        self.token_uri = token_uri.into();
        self
    }

    /// Override the redirect URI template.
    pub fn with_redirect_template(mut self, template: impl Into<String>) -> Self {
        self.redirect_uri_template = template.into();
        self
    }

    /// Parse a client-secrets JSON document (`{"installed": {...}}` or
    /// `{"web": {...}}`).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid client credentials JSON: {e}")))?;
        let creds = match file {
            CredentialsFile::Installed(c) | CredentialsFile::Web(c) => c,
        };
        if creds.client_id.is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }
        Ok(creds)
    }

    /// Build the concrete redirect URI for a loopback listener port.
    pub fn redirect_uri(&self, port: u16) -> String {
        self.redirect_uri_template
            .replace("{port}", &port.to_string())
    }
}
