//! # drive-gateway
//!
//! Async client library for the Drive v3 REST API: OAuth 2.0 authorization
//! with PKCE, an authorized transport with automatic token refresh, and
//! resumable uploads.
//!
//! ## Architecture
//!
//! ```text
//! DriveClient
//!    ├── AuthController ── AccessTokenProvider (loopback / broker / redirect)
//!    │        └── TokenCache ── KeyValueStore (file / memory / keyring)
//!    ├── AuthorizedClient ── RequestDispatcher
//!    └── ResumableUpload
//! ```
//!
//! - **oauth**: PKCE, credentials, consent URL, loopback callback capture,
//!   token endpoint exchanges, acquisition strategies.
//! - **auth**: token state ownership and coalesced refresh; concurrent
//!   expiry hits share one refresh and one user prompt.
//! - **storage**: pluggable token persistence.
//! - **transport**: request description, bearer attachment, one
//!   refresh-and-resend on `401`, abortable dispatch.
//! - **upload**: the resumable-session state machine with offset recovery
//!   and session restart.
//!
//! ## Quick start
//!
//! ```no_run
//! use drive_gateway::{ApiRequest, ClientCredentials, DriveClient};
//!
//! # async fn demo() -> drive_gateway::Result<()> {
//! let client = DriveClient::builder()
//!     .credentials(ClientCredentials::installed("my-client-id"))
//!     .build()?;
//!
//! client.authorize().await?;
//!
//! let outcome = client
//!     .upload(serde_json::json!({"name": "report.pdf"}))
//!     .with_content_type("application/pdf")
//!     .with_payload(std::fs::read("report.pdf").map_err(|e| {
//!         drive_gateway::Error::Config(e.to_string())
//!     })?)
//!     .run()
//!     .await?;
//! assert!(outcome.completed);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod oauth;
pub mod storage;
pub mod transport;
pub mod upload;

pub use auth::AuthController;
pub use client::{DriveClient, DriveClientBuilder};
pub use config::StorageKeys;
pub use error::{Error, Result};
pub use oauth::{
    AccessTokenProvider, AuthorizationBroker, ClientCredentials, LoopbackProvider,
    NativeBrokerProvider, PlatformCapabilities, RedirectProvider, SystemBrowser, TokenState,
    UserAgentLauncher,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TokenCache};
#[cfg(feature = "system-keyring")]
pub use storage::KeyringStore;
pub use transport::{ApiRequest, AuthorizedClient, RawResponse, RequestDispatcher};
pub use upload::{ResumableUpload, UploadOutcome};
