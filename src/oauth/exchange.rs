//! Token endpoint exchanges.
//!
//! Two narrow HTTP operations against the OAuth token endpoint:
//! - authorization code + PKCE verifier -> access token (+ refresh token)
//! - refresh token -> access token
//!
//! Both issue exactly one form-encoded `POST` and never retry; the caller
//! (the access-token provider, or its fallback-to-full-auth logic) decides
//! what happens after a failure. A structured `{error, error_description}`
//! body is an application-level error distinct from transport failure.

use serde::Deserialize;
use tracing::{debug, warn};

use super::credentials::ClientCredentials;
use super::token::TokenState;
use crate::error::{Error, Result};

/// Token response from the token endpoint. The `error` field doubles as the
/// application-level failure signal regardless of HTTP status.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchange an authorization code for tokens.
///
/// Sends `grant_type=authorization_code` with the PKCE verifier and the
/// exact redirect URI the code was issued against.
pub async fn exchange_auth_code(
    http: &reqwest::Client,
    credentials: &ClientCredentials,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenState> {
    debug!("Exchanging authorization code for tokens");

    let mut form = vec![
        ("code", code),
        ("code_verifier", code_verifier),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri),
        ("client_id", credentials.client_id.as_str()),
    ];
    if let Some(secret) = credentials.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let response = http
        .post(&credentials.token_uri)
        .form(&form)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;

    let parsed = parse_token_body(status.as_u16(), &body, "code exchange")?;
    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::ExchangeFailed("no access token in response".into()))?;

    debug!("Code exchange successful");
    Ok(TokenState::new(access_token, parsed.refresh_token))
}

/// Refresh an access token.
///
/// Sends `grant_type=refresh_token`. When the server does not rotate the
/// refresh token, the old one is carried forward in the returned state.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    credentials: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenState> {
    debug!("Refreshing access token");

    let mut form = vec![
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
        ("client_id", credentials.client_id.as_str()),
    ];
    if let Some(secret) = credentials.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let response = http
        .post(&credentials.token_uri)
        .form(&form)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;

    let parsed = parse_token_body(status.as_u16(), &body, "token refresh")?;
    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::ExchangeFailed("no access token in response".into()))?;

    let new_refresh = parsed
        .refresh_token
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| refresh_token.to_string());

    debug!("Token refresh successful");
    Ok(TokenState::new(access_token, Some(new_refresh)))
}

/// Parse a token endpoint body, mapping the `error` field and non-success
/// statuses onto the error taxonomy.
fn parse_token_body(status: u16, body: &str, operation: &str) -> Result<TokenEndpointResponse> {
    match serde_json::from_str::<TokenEndpointResponse>(body) {
        Ok(parsed) => {
            if let Some(error) = parsed.error.as_deref().filter(|e| !e.is_empty()) {
                let description = parsed
                    .error_description
                    .clone()
                    .unwrap_or_else(|| error.to_string());
                warn!(error, description = %description, "{} failed", operation);
                if error == "invalid_grant" {
                    return Err(Error::TokenExpired);
                }
                return Err(Error::ExchangeFailed(description));
            }
            if !(200..300).contains(&status) {
                return Err(Error::ExchangeFailed(format!("HTTP {}: {}", status, body)));
            }
            Ok(parsed)
        }
        Err(e) if (200..300).contains(&status) => {
            Err(Error::ExchangeFailed(format!("invalid token response: {e}")))
        }
        Err(_) => Err(Error::ExchangeFailed(format!("HTTP {}: {}", status, body))),
    }
}
