//! Authorization callback parsing and validation.
//!
//! The browser redirect lands on the loopback listener (or is handed over
//! by a platform broker) as a query string carrying `code`, `state`, or
//! `error`. Validation is strict: the `state` must match the one generated
//! for this attempt byte-for-byte, regardless of whether a well-formed
//! `code` is present.

use crate::error::{Error, Result};

/// HTML page shown in the browser after a successful authorization.
pub const SUCCESS_HTML: &str = "<html><body><h1>Authorization complete</h1>\
<p>You may close this window and return to the application.</p></body></html>";

/// HTML page shown in the browser after a failed authorization.
pub const ERROR_HTML: &str = "<html><body><h1>Authorization failed</h1>\
<p>You may close this window and retry from the application.</p></body></html>";

/// Query parameters delivered by the authorization server's redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code, on success.
    pub code: Option<String>,
    /// Anti-CSRF state echoed back by the server.
    pub state: Option<String>,
    /// Error code, when the user denied consent or the request was invalid.
    pub error: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string (`code=...&state=...`).
    pub fn parse_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&') {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next().unwrap_or_default();
            let value = kv.next().unwrap_or_default();
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "code" => params.code = Some(decoded),
                "state" => params.state = Some(decoded),
                "error" => params.error = Some(decoded),
                _ => {}
            }
        }
        params
    }
}

/// Validate callback parameters against the state generated for this
/// attempt and extract the authorization code.
///
/// No retry happens at this layer; any mismatch is a terminal error for
/// the attempt.
pub fn validate_callback(params: &CallbackParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error.as_deref() {
        return Err(Error::AuthFlow(format!(
            "authorization server returned error: {error}"
        )));
    }

    // State first: a valid-looking code with the wrong state is a replay.
    match params.state.as_deref() {
        Some(state) if state == expected_state => {}
        Some(_) => return Err(Error::InvalidState),
        None => return Err(Error::AuthFlow("missing state parameter".into())),
    }

    params
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::AuthFlow("missing code parameter".into()))
}
