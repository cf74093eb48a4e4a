//! OAuth 2.0 authorization for the Drive API.
//!
//! Implements the authorization-code flow with PKCE (RFC 7636) against the
//! standard Google endpoints, with the interactive leg pluggable through
//! [`AccessTokenProvider`] strategies:
//!
//! 1. Generate a PKCE verifier/challenge pair and an anti-CSRF state nonce.
//! 2. Open the consent URL in the user's agent.
//! 3. Capture the redirect (loopback listener, platform broker, or relaunch
//!    URL) and validate `state` byte-for-byte.
//! 4. Exchange the authorization code for an access + refresh token pair.
//!
//! Refresh is always attempted before interacting with the user; only a
//! rejected refresh grant (`invalid_grant`) escalates to a new consent.

pub mod callback;
pub mod credentials;
pub mod exchange;
pub mod loopback;
pub mod pkce;
pub mod provider;
pub mod token;

pub use callback::{validate_callback, CallbackParams};
pub use credentials::ClientCredentials;
pub use exchange::{exchange_auth_code, refresh_access_token};
pub use loopback::LoopbackListener;
pub use pkce::{random_state, Pkce};
pub use provider::{
    build_authorize_url, select_provider, AccessTokenProvider, AuthorizationBroker,
    AuthorizeRequest, LoopbackProvider, NativeBrokerProvider, PlatformCapabilities,
    RedirectProvider, SystemBrowser, UserAgentLauncher,
};
pub use token::TokenState;
