//! Shared fixtures and helpers for the wiremock-backed integration tests.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;

use drive_gateway::{AccessTokenProvider, Result, TokenState};

/// Read one header off a recorded request.
pub fn header_value<'a>(request: &'a wiremock::Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}

/// Decode an `application/x-www-form-urlencoded` request body.
pub fn form_params(request: &wiremock::Request) -> HashMap<String, String> {
    String::from_utf8_lossy(&request.body)
        .split('&')
        .filter_map(|pair| {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next()?;
            let value = kv.next().unwrap_or_default();
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}

/// Provider yielding a fixed token, counting how often it is asked.
pub struct StaticTokenProvider {
    pub token: String,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl StaticTokenProvider {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn provide_access_token(&self) -> Result<TokenState> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(TokenState::new(self.token.clone(), Some("rt".into())))
    }

    fn name(&self) -> &str {
        "static"
    }
}
