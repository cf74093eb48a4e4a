//! Error types for the drive-gateway library.
//!
//! All failures are surfaced through the crate-wide [`Error`] enum. The enum
//! is `Clone` so that a single in-flight operation (a coalesced token refresh,
//! a shared request future) can report its one outcome to every waiter.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for authorization, transport and upload failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network-level failure: connection refused, DNS, TLS, broken pipe.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The endpoint was reachable but answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The token endpoint answered with a structured `{error, error_description}` body.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The refresh token was rejected (`invalid_grant`); full re-auth is required.
    #[error("refresh token expired or revoked")]
    TokenExpired,

    /// Authorization flow failure: consent denied, missing callback
    /// parameters, listener bind failure.
    #[error("authorization flow failed: {0}")]
    AuthFlow(String),

    /// The callback `state` did not match the one generated for this attempt.
    #[error("invalid state token")]
    InvalidState,

    /// A second unauthorized response arrived after a completed token
    /// refresh; retrying further would loop forever.
    #[error("request still unauthorized after token refresh")]
    RefreshExhausted,

    /// The resumable session URI is no longer known to the server.
    #[error("resumable session expired")]
    SessionExpired,

    /// The operation was aborted or cancelled by the caller.
    #[error("operation aborted")]
    Aborted,

    /// Token storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration or credentials.
    #[error("config error: {0}")]
    Config(String),

    /// Resumable upload protocol violation (e.g. resume without payload).
    #[error("upload error: {0}")]
    Upload(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(err.to_string())
        }
    }
}
