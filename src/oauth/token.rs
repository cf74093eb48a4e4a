//! Cached token state.
//!
//! [`TokenState`] holds the access token currently used for API calls and,
//! when the server issued one, the long-lived refresh token. No expiry is
//! tracked locally: expiry is discovered reactively through an unauthorized
//! response, never proactively through a timer.

use serde::{Deserialize, Serialize};

/// The pair of credentials cached for one application/account context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenState {
    /// Short-lived bearer credential for API calls.
    pub access_token: String,

    /// Long-lived credential used to mint new access tokens without user
    /// interaction. Absent for flows that cannot issue one (implicit
    /// redirect capture).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenState {
    /// Create a token state from an access token and optional refresh token.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Whether a refresh token is available for the cheap refresh path.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}
