//! End-to-end authorization and transport behavior against a mock token
//! endpoint / API server.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{form_params, header_value, StaticTokenProvider};
use drive_gateway::oauth::Pkce;
use drive_gateway::{
    AccessTokenProvider, ApiRequest, AuthController, AuthorizedClient, ClientCredentials, Error,
    LoopbackProvider, MemoryStore, RequestDispatcher, Result, StorageKeys, TokenCache, TokenState,
    UserAgentLauncher,
};

/// Launcher that plays the browser's part: it records the consent URL and
/// immediately delivers the redirect to the loopback listener.
struct CallbackLauncher {
    captured_url: Arc<Mutex<Option<String>>>,
    code: &'static str,
    state_override: Option<&'static str>,
}

impl CallbackLauncher {
    fn new(captured_url: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            captured_url,
            code: "test-code",
            state_override: None,
        }
    }
}

impl UserAgentLauncher for CallbackLauncher {
    fn launch(&self, url: &str) -> Result<()> {
        *self.captured_url.lock().unwrap() = Some(url.to_string());

        let parsed = url::Url::parse(url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        let redirect_uri = params["redirect_uri"].clone();
        let state = self
            .state_override
            .map(str::to_string)
            .unwrap_or_else(|| params["state"].clone());
        let code = self.code;

        tokio::spawn(async move {
            let callback = format!(
                "{redirect_uri}?code={code}&state={}",
                urlencoding::encode(&state)
            );
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

struct PanicLauncher;

impl UserAgentLauncher for PanicLauncher {
    fn launch(&self, _url: &str) -> Result<()> {
        panic!("interactive flow must not run");
    }
}

fn memory_cache() -> TokenCache {
    TokenCache::new(Arc::new(MemoryStore::new()), StorageKeys::default())
}

fn credentials(server: &MockServer) -> ClientCredentials {
    ClientCredentials::installed("test-client")
        .with_endpoints("https://accounts.example/auth", format!("{}/token", server.uri()))
}

#[tokio::test]
async fn interactive_flow_exchanges_code_with_pkce() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3599,
        })))
        .mount(&server)
        .await;

    let cache = memory_cache();
    let captured_url = Arc::new(Mutex::new(None));
    let provider = LoopbackProvider::new(
        reqwest::Client::new(),
        credentials(&server),
        "scope-x",
        cache.clone(),
    )
    .with_launcher(Arc::new(CallbackLauncher::new(captured_url.clone())));

    let state = provider.provide_access_token().await.unwrap();
    assert_eq!(state.access_token, "at-1");
    assert_eq!(state.refresh_token.as_deref(), Some("rt-1"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let form = form_params(&requests[0]);
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "test-code");
    assert_eq!(form["client_id"], "test-client");

    // The verifier sent to the token endpoint must match the challenge
    // advertised in the consent URL, and the redirect URI must be the one
    // the code was issued against.
    let consent = captured_url.lock().unwrap().clone().unwrap();
    let parsed = url::Url::parse(&consent).unwrap();
    let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["code_challenge_method"], "S256");
    assert_eq!(query["scope"], "scope-x");
    assert_eq!(query["access_type"], "offline");
    assert!(Pkce::verify(&form["code_verifier"], &query["code_challenge"]));
    assert_eq!(form["redirect_uri"], query["redirect_uri"]);

    // The tokens were persisted, so the next acquisition takes the
    // refresh-token path and never opens a browser.
    cache.save(&state).await.unwrap();
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "at-1b"})),
        )
        .mount(&server)
        .await;

    let state = provider.provide_access_token().await.unwrap();
    assert_eq!(state.access_token, "at-1b");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let form = form_params(&requests[1]);
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "rt-1");
}

#[tokio::test]
async fn interactive_flow_rejects_forged_state() {
    let server = MockServer::start().await;

    let provider = LoopbackProvider::new(
        reqwest::Client::new(),
        credentials(&server),
        "scope-x",
        memory_cache(),
    )
    .with_launcher(Arc::new(CallbackLauncher {
        captured_url: Arc::new(Mutex::new(None)),
        code: "attacker-code",
        state_override: Some("forged-state"),
    }));

    let err = provider.provide_access_token().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState));
    // The forged code never reaches the token endpoint.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_refresh_token_avoids_user_interaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at-2"})),
        )
        .mount(&server)
        .await;

    let cache = memory_cache();
    cache
        .save(&TokenState::new("stale", Some("rt-0".into())))
        .await
        .unwrap();

    let provider = LoopbackProvider::new(
        reqwest::Client::new(),
        credentials(&server),
        "scope-x",
        cache,
    )
    .with_launcher(Arc::new(PanicLauncher));

    let state = provider.provide_access_token().await.unwrap();
    assert_eq!(state.access_token, "at-2");
    // Refresh token survives a response that did not rotate it.
    assert_eq!(state.refresh_token.as_deref(), Some("rt-0"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let form = form_params(&requests[0]);
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "rt-0");
}

#[tokio::test]
async fn blank_refresh_token_goes_straight_to_interactive_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at-4"})),
        )
        .mount(&server)
        .await;

    // A cached state whose refresh token is empty must not be sent to the
    // token endpoint as a refresh grant.
    let cache = memory_cache();
    cache
        .save(&TokenState::new("stale", Some(String::new())))
        .await
        .unwrap();

    let provider = LoopbackProvider::new(
        reqwest::Client::new(),
        credentials(&server),
        "scope-x",
        cache,
    )
    .with_launcher(Arc::new(CallbackLauncher::new(Arc::new(Mutex::new(None)))));

    let state = provider.provide_access_token().await.unwrap();
    assert_eq!(state.access_token, "at-4");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(form_params(&requests[0])["grant_type"], "authorization_code");
}

#[tokio::test]
async fn rejected_refresh_grant_falls_back_to_interactive_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-3",
            "refresh_token": "rt-3",
        })))
        .mount(&server)
        .await;

    let cache = memory_cache();
    cache
        .save(&TokenState::new("stale", Some("revoked-rt".into())))
        .await
        .unwrap();

    let provider = LoopbackProvider::new(
        reqwest::Client::new(),
        credentials(&server),
        "scope-x",
        cache,
    )
    .with_launcher(Arc::new(CallbackLauncher::new(Arc::new(Mutex::new(None)))));

    let state = provider.provide_access_token().await.unwrap();
    assert_eq!(state.access_token, "at-3");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(form_params(&requests[0])["grant_type"], "refresh_token");
    assert_eq!(form_params(&requests[1])["grant_type"], "authorization_code");
}

async fn controller_with(
    provider: Arc<dyn AccessTokenProvider>,
    cached_token: Option<&str>,
) -> Arc<AuthController> {
    let cache = memory_cache();
    if let Some(token) = cached_token {
        cache
            .save(&TokenState::new(token, None))
            .await
            .unwrap();
    }
    Arc::new(AuthController::new(cache, provider))
}

#[tokio::test]
async fn unauthorized_response_triggers_one_refresh_and_resend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let provider = Arc::new(StaticTokenProvider::new("fresh"));
    let auth = controller_with(provider.clone(), Some("stale")).await;

    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);
    let value: serde_json::Value = client
        .execute_json(&ApiRequest::get(format!("{}/files/f1", server.uri())))
        .await
        .unwrap();
    assert_eq!(value["ok"], true);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(header_value(&requests[0], "authorization"), Some("Bearer stale"));
    assert_eq!(header_value(&requests[1], "authorization"), Some("Bearer fresh"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_unauthorized_after_refresh_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = Arc::new(StaticTokenProvider::new("fresh"));
    let auth = controller_with(provider.clone(), Some("stale")).await;

    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);
    let err = client
        .execute(&ApiRequest::get(format!("{}/files/f1", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RefreshExhausted));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_token_is_acquired_before_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "f1"})))
        .mount(&server)
        .await;

    let provider = Arc::new(StaticTokenProvider::new("first"));
    let auth = controller_with(provider.clone(), None).await;

    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);
    let value: serde_json::Value = client
        .execute_json(&ApiRequest::get(format!("{}/files/f1", server.uri())))
        .await
        .unwrap();
    assert_eq!(value["id"], "f1");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(header_value(&requests[0], "authorization"), Some("Bearer first"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_unauthorized_hits_share_one_refresh() {
    struct SlowProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccessTokenProvider for SlowProvider {
        async fn provide_access_token(&self) -> Result<TokenState> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok(TokenState::new("fresh", None))
        }
    }

    // Both initial requests get a delayed 401 so the two resulting refresh
    // attempts overlap and must coalesce.
    let server = MockServer::start().await;
    Mock::given(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"n": 1})))
        .mount(&server)
        .await;

    let provider = Arc::new(SlowProvider {
        calls: AtomicUsize::new(0),
    });
    let auth = controller_with(provider.clone(), Some("stale")).await;
    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);

    let a = {
        let client = client.clone();
        let request = ApiRequest::get(format!("{}/a", server.uri()));
        tokio::spawn(async move { client.execute_json::<serde_json::Value>(&request).await })
    };
    let b = {
        let client = client.clone();
        let request = ApiRequest::get(format!("{}/b", server.uri()));
        tokio::spawn(async move { client.execute_json::<serde_json::Value>(&request).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn dispatcher_send_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "f1"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = controller_with(Arc::new(StaticTokenProvider::new("t")), Some("t")).await;
    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);
    let dispatcher: RequestDispatcher<serde_json::Value> = RequestDispatcher::new(
        client,
        ApiRequest::get(format!("{}/files/f1", server.uri())),
    );

    let first = dispatcher.send().await.unwrap();
    let second = dispatcher.send().await.unwrap();
    assert_eq!(first, second);
    // Only one request ever went out; the second send replayed the outcome.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(dispatcher.outcome().unwrap().is_ok());
    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn dispatcher_abort_cancels_every_waiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": "f1"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let auth = controller_with(Arc::new(StaticTokenProvider::new("t")), Some("t")).await;
    let client = AuthorizedClient::with_client(reqwest::Client::new(), auth);
    let dispatcher: Arc<RequestDispatcher<serde_json::Value>> = Arc::new(RequestDispatcher::new(
        client,
        ApiRequest::get(format!("{}/slow", server.uri())),
    ));

    let pending = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dispatcher.is_running());

    dispatcher.abort();
    assert!(matches!(pending.await.unwrap(), Err(Error::Aborted)));
    // Joining after abort observes the recorded outcome.
    assert!(matches!(dispatcher.send().await, Err(Error::Aborted)));
    assert!(!dispatcher.is_running());
}
