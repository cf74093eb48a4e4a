//! Access-token acquisition strategies.
//!
//! The [`AccessTokenProvider`] trait abstracts over the ways a fresh access
//! token can be obtained:
//!
//! - [`LoopbackProvider`]: refresh the cached token when possible, otherwise
//!   run the full authorization-code + PKCE flow through the system browser
//!   and a one-shot loopback listener.
//! - [`NativeBrokerProvider`]: delegate the interactive part to a
//!   platform authorization broker that returns the callback parameters.
//! - [`RedirectProvider`]: last resort for environments where the
//!   application itself is re-entered via the redirect; the token arrives in
//!   the relaunch URL and cannot be refreshed.
//!
//! [`select_provider`] picks the best strategy the platform supports.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::callback::{validate_callback, CallbackParams};
use super::credentials::ClientCredentials;
use super::exchange::{exchange_auth_code, refresh_access_token};
use super::loopback::LoopbackListener;
use super::pkce::{random_state, Pkce};
use super::token::TokenState;
use crate::error::{Error, Result};
use crate::storage::TokenCache;

/// Everything a broker or launcher needs to present one authorization
/// attempt to the user.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Fully assembled authorization URL.
    pub url: String,
    /// Anti-CSRF state nonce bound to this attempt.
    pub state: String,
    /// Redirect URI the authorization code will be issued against.
    pub redirect_uri: String,
}

/// Strategy for obtaining a fresh token state.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Obtain a fresh token state, interacting with the user if necessary.
    async fn provide_access_token(&self) -> Result<TokenState>;

    /// Name of this strategy.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: AccessTokenProvider + ?Sized> AccessTokenProvider for Arc<T> {
    async fn provide_access_token(&self) -> Result<TokenState> {
        (**self).provide_access_token().await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Opens an authorization URL in the user's agent (normally a browser).
pub trait UserAgentLauncher: Send + Sync {
    /// Launch the URL. Returns once the agent has been started, not once
    /// the user has acted.
    fn launch(&self, url: &str) -> Result<()>;
}

/// Default launcher: the platform's URL-open command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl UserAgentLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> Result<()> {
        debug!("Opening authorization URL in system browser");

        #[cfg(target_os = "linux")]
        let result = std::process::Command::new("xdg-open").arg(url).spawn();
        #[cfg(target_os = "macos")]
        let result = std::process::Command::new("open").arg(url).spawn();
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn();
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        let result: std::io::Result<std::process::Child> = Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no URL launcher on this platform",
        ));

        result
            .map(|_| ())
            .map_err(|e| Error::AuthFlow(format!("failed to open browser: {e}")))
    }
}

/// Platform authorization broker: presents the consent UI and hands back
/// the raw callback parameters.
#[async_trait]
pub trait AuthorizationBroker: Send + Sync {
    /// Redirect URI the broker delivers callbacks to.
    fn redirect_uri(&self) -> String;

    /// Run one authorization attempt and return the callback parameters.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<CallbackParams>;
}

/// Assemble the authorization-code + PKCE consent URL.
pub fn build_authorize_url(
    credentials: &ClientCredentials,
    scope: &str,
    redirect_uri: &str,
    state: &str,
    pkce: &Pkce,
) -> Result<String> {
    let mut url = url::Url::parse(&credentials.auth_uri)
        .map_err(|e| Error::Config(format!("invalid auth_uri: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &credentials.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("state", state)
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", pkce.method)
        // Ask for a refresh token on every consent, not just the first.
        .append_pair("access_type", "offline")
        .append_pair("approval_prompt", "force");
    Ok(url.into())
}

/// Refresh-first provider falling back to the full browser + loopback flow.
pub struct LoopbackProvider {
    http: reqwest::Client,
    credentials: ClientCredentials,
    scope: String,
    cache: TokenCache,
    launcher: Arc<dyn UserAgentLauncher>,
}

impl LoopbackProvider {
    pub fn new(
        http: reqwest::Client,
        credentials: ClientCredentials,
        scope: impl Into<String>,
        cache: TokenCache,
    ) -> Self {
        Self {
            http,
            credentials,
            scope: scope.into(),
            cache,
            launcher: Arc::new(SystemBrowser),
        }
    }

    /// Replace the browser launcher (tests, embedded webviews).
    pub fn with_launcher(mut self, launcher: Arc<dyn UserAgentLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Full interactive flow: listener, browser, callback, code exchange.
    async fn interactive_auth(&self) -> Result<TokenState> {
        let pkce = Pkce::generate();
        let state = random_state();

        let listener = LoopbackListener::bind().await?;
        let redirect_uri = self.credentials.redirect_uri(listener.port());
        let url = build_authorize_url(
            &self.credentials,
            &self.scope,
            &redirect_uri,
            &state,
            &pkce,
        )?;

        info!(port = listener.port(), "Starting interactive authorization");
        self.launcher.launch(&url)?;

        let params = listener.accept_callback().await?;
        let code = validate_callback(&params, &state)?;

        exchange_auth_code(
            &self.http,
            &self.credentials,
            &code,
            &pkce.verifier,
            &redirect_uri,
        )
        .await
    }
}

#[async_trait]
impl AccessTokenProvider for LoopbackProvider {
    async fn provide_access_token(&self) -> Result<TokenState> {
        // Try the cached refresh token first; only a rejected grant falls
        // through to the interactive flow. Transport failures propagate so
        // a network blip never triggers a surprise browser window.
        let refresh = self
            .cache
            .load()
            .await?
            .filter(TokenState::has_refresh_token)
            .and_then(|state| state.refresh_token);
        if let Some(refresh) = refresh {
            match refresh_access_token(&self.http, &self.credentials, &refresh).await {
                Ok(state) => return Ok(state),
                Err(Error::TokenExpired) => {
                    warn!("Refresh token rejected; falling back to interactive authorization");
                }
                Err(e) => return Err(e),
            }
        }

        self.interactive_auth().await
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

/// Provider delegating the interactive part to a platform broker.
pub struct NativeBrokerProvider {
    http: reqwest::Client,
    credentials: ClientCredentials,
    scope: String,
    cache: TokenCache,
    broker: Arc<dyn AuthorizationBroker>,
}

impl NativeBrokerProvider {
    pub fn new(
        http: reqwest::Client,
        credentials: ClientCredentials,
        scope: impl Into<String>,
        cache: TokenCache,
        broker: Arc<dyn AuthorizationBroker>,
    ) -> Self {
        Self {
            http,
            credentials,
            scope: scope.into(),
            cache,
            broker,
        }
    }
}

#[async_trait]
impl AccessTokenProvider for NativeBrokerProvider {
    async fn provide_access_token(&self) -> Result<TokenState> {
        let refresh = self
            .cache
            .load()
            .await?
            .filter(TokenState::has_refresh_token)
            .and_then(|state| state.refresh_token);
        if let Some(refresh) = refresh {
            match refresh_access_token(&self.http, &self.credentials, &refresh).await {
                Ok(state) => return Ok(state),
                Err(Error::TokenExpired) => {
                    warn!("Refresh token rejected; delegating to authorization broker");
                }
                Err(e) => return Err(e),
            }
        }

        let pkce = Pkce::generate();
        let state = random_state();
        let redirect_uri = self.broker.redirect_uri();
        let url = build_authorize_url(
            &self.credentials,
            &self.scope,
            &redirect_uri,
            &state,
            &pkce,
        )?;

        info!("Starting broker-mediated authorization");
        let request = AuthorizeRequest {
            url,
            state: state.clone(),
            redirect_uri: redirect_uri.clone(),
        };
        let params = self.broker.authorize(&request).await?;
        let code = validate_callback(&params, &state)?;

        exchange_auth_code(
            &self.http,
            &self.credentials,
            &code,
            &pkce.verifier,
            &redirect_uri,
        )
        .await
    }

    fn name(&self) -> &str {
        "native-broker"
    }
}

/// Last-resort provider for environments where the application itself is
/// relaunched with the redirect URL carrying the token in its fragment.
///
/// Tokens obtained this way have no refresh token; when they expire the
/// whole flow runs again.
pub struct RedirectProvider {
    redirect_url: String,
}

impl RedirectProvider {
    /// Wrap the relaunch URL the redirect delivered.
    pub fn from_redirect_url(redirect_url: impl Into<String>) -> Self {
        Self {
            redirect_url: redirect_url.into(),
        }
    }

    /// Pull `access_token` out of the URL fragment (or query, for servers
    /// that put it there).
    fn extract_access_token(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let fragment_token = parsed.fragment().and_then(|f| {
            f.split('&').find_map(|pair| {
                pair.strip_prefix("access_token=")
                    .map(|v| urlencoding::decode(v).map(|d| d.into_owned()).ok())
                    .flatten()
            })
        });
        if let Some(token) = fragment_token.filter(|t| !t.is_empty()) {
            return Some(token);
        }
        parsed
            .query_pairs()
            .find(|(k, _)| k == "access_token")
            .map(|(_, v)| v.into_owned())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl AccessTokenProvider for RedirectProvider {
    async fn provide_access_token(&self) -> Result<TokenState> {
        Self::extract_access_token(&self.redirect_url)
            .map(|token| TokenState::new(token, None))
            .ok_or_else(|| Error::AuthFlow("no access token in redirect URL".into()))
    }

    fn name(&self) -> &str {
        "redirect"
    }
}

/// What the runtime platform can do, used to pick a provider.
#[derive(Clone, Default)]
pub struct PlatformCapabilities {
    /// A loopback listener can be bound and the browser can reach it.
    pub can_bind_loopback: bool,
    /// A system browser (or equivalent) can be launched.
    pub can_launch_browser: bool,
    /// A platform authorization broker is available.
    pub broker: Option<Arc<dyn AuthorizationBroker>>,
    /// Relaunch URL, when the process was re-entered via a redirect.
    pub redirect_url: Option<String>,
}

impl PlatformCapabilities {
    /// Capabilities of a typical desktop environment.
    pub fn desktop() -> Self {
        Self {
            can_bind_loopback: true,
            can_launch_browser: true,
            broker: None,
            redirect_url: None,
        }
    }
}

impl std::fmt::Debug for PlatformCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCapabilities")
            .field("can_bind_loopback", &self.can_bind_loopback)
            .field("can_launch_browser", &self.can_launch_browser)
            .field("broker", &self.broker.is_some())
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// Pick the best available strategy: broker, then loopback, then redirect.
pub fn select_provider(
    http: reqwest::Client,
    credentials: ClientCredentials,
    scope: &str,
    cache: TokenCache,
    capabilities: &PlatformCapabilities,
) -> Result<Arc<dyn AccessTokenProvider>> {
    if let Some(broker) = capabilities.broker.clone() {
        debug!("Selected native-broker authorization strategy");
        return Ok(Arc::new(NativeBrokerProvider::new(
            http,
            credentials,
            scope,
            cache,
            broker,
        )));
    }
    if capabilities.can_bind_loopback && capabilities.can_launch_browser {
        debug!("Selected loopback authorization strategy");
        return Ok(Arc::new(LoopbackProvider::new(
            http,
            credentials,
            scope,
            cache,
        )));
    }
    if let Some(url) = capabilities.redirect_url.clone() {
        debug!("Selected redirect authorization strategy");
        return Ok(Arc::new(RedirectProvider::from_redirect_url(url)));
    }
    Err(Error::Config(
        "no authorization strategy available on this platform".into(),
    ))
}
