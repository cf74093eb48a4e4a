//! Resumable upload state machine.
//!
//! One upload moves through three phases:
//!
//! 1. **Initiate**: `POST` the file metadata to the upload endpoint; the
//!    `Location` response header names the session URI, a capability URL
//!    valid for about a week.
//! 2. **Transfer**: `PUT` the payload to the session URI. A `308 Resume
//!    Incomplete` carries a `Range` header naming the last byte the server
//!    holds; the transfer resumes from the next byte. When resuming an
//!    existing session the confirmed offset is first probed with a
//!    zero-byte `PUT` (`Content-Range: bytes */{total}`).
//! 3. **Complete**: a `200`/`201` carries the created file resource.
//!
//! A `404` on the status probe means the session holds nothing; the
//! transfer restarts from byte zero. Errors on the transfer itself are
//! terminal, except a `401`, which triggers one coalesced token refresh and
//! then the same `PUT` again.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::session::{blended_progress, confirmed_offset, content_range, content_range_probe};
use crate::config::resumable_upload_url;
use crate::error::{Error, Result};
use crate::transport::{ApiRequest, AuthorizedClient, RawResponse};

/// Progress observer, called with a fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Final state of a finished [`ResumableUpload::run`].
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The session URI, usable to resume or hand off the upload.
    pub session_uri: String,
    /// Whether the server acknowledged the full payload.
    pub completed: bool,
    /// The created file resource, when completed.
    pub response: Option<serde_json::Value>,
}

enum Probe {
    Incomplete(u64),
    Completed(RawResponse),
}

/// A resumable upload in progress.
pub struct ResumableUpload {
    client: AuthorizedClient,
    metadata: Option<serde_json::Value>,
    content_type: String,
    payload: Option<Vec<u8>>,
    session_uri: Option<String>,
    init_url: String,
    progress: Option<ProgressFn>,
    /// Set when the session URI was supplied by the caller, in which case
    /// the confirmed offset must be probed before the first transfer.
    resuming: bool,
}

impl ResumableUpload {
    /// Start a new upload for the given file metadata.
    pub fn new(client: AuthorizedClient, metadata: serde_json::Value) -> Self {
        Self {
            client,
            metadata: Some(metadata),
            content_type: "application/octet-stream".to_string(),
            payload: None,
            session_uri: None,
            init_url: resumable_upload_url(),
            progress: None,
            resuming: false,
        }
    }

    /// Resume an upload against a previously issued session URI.
    ///
    /// The payload must be byte-identical to the one the session was
    /// initiated with.
    pub fn resume(client: AuthorizedClient, session_uri: impl Into<String>) -> Self {
        Self {
            client,
            metadata: None,
            content_type: "application/octet-stream".to_string(),
            payload: None,
            session_uri: Some(session_uri.into()),
            init_url: resumable_upload_url(),
            progress: None,
            resuming: true,
        }
    }

    /// The payload to transfer. An upload without a payload stops after
    /// initiation and hands the session URI to the caller.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// MIME type of the payload.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Override the initiation endpoint (non-default deployments).
    pub fn with_init_url(mut self, url: impl Into<String>) -> Self {
        self.init_url = url.into();
        self
    }

    /// Observe progress as a fraction in `[0, 1]`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The session URI, once initiation has happened.
    pub fn session_uri(&self) -> Option<&str> {
        self.session_uri.as_deref()
    }

    /// Initiate the session: `POST` metadata, record the `Location` header.
    pub async fn initiate(&mut self) -> Result<&str> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| Error::Upload("cannot initiate without file metadata".into()))?;

        let mut request = ApiRequest::post(&self.init_url)
            .json(metadata.clone())
            .header("X-Upload-Content-Type", &self.content_type);
        if let Some(payload) = &self.payload {
            request = request.header("X-Upload-Content-Length", payload.len().to_string());
        }

        let response = self.client.execute(&request).await?;
        if !response.is_success() {
            return Err(Error::Api {
                status: response.status,
                message: response.text(),
            });
        }
        let location = response
            .header("Location")
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::Upload("initiation response carried no session URI".into()))?
            .to_string();

        info!("Resumable session initiated");
        self.session_uri = Some(location);
        Ok(self.session_uri.as_deref().unwrap_or_default())
    }

    /// Drive the upload to its end state.
    ///
    /// Without a payload this initiates the session and returns an
    /// incomplete outcome carrying the session URI.
    pub async fn run(mut self) -> Result<UploadOutcome> {
        if self.session_uri.is_none() {
            self.initiate().await?;
        }
        let session_uri = self
            .session_uri
            .clone()
            .ok_or_else(|| Error::Upload("no session URI".into()))?;

        let Some(payload) = self.payload.clone() else {
            if self.resuming {
                return Err(Error::Upload(
                    "resuming a session requires the original payload".into(),
                ));
            }
            return Ok(UploadOutcome {
                session_uri,
                completed: false,
                response: None,
            });
        };
        let total = payload.len() as u64;

        let mut offset: u64 = if self.resuming {
            match self.probe(&session_uri, total).await? {
                Probe::Incomplete(offset) => offset.min(total),
                Probe::Completed(response) => {
                    return Ok(self.completed_outcome(session_uri, response));
                }
            }
        } else {
            0
        };

        let mut refreshed = false;
        let mut stalls = 0u32;

        loop {
            self.report(blended_progress(offset, total, 0.0));

            let response = self.transfer(&session_uri, &payload, offset, total).await?;
            match response.status {
                200 | 201 => {
                    self.report(1.0);
                    return Ok(self.completed_outcome(session_uri, response));
                }
                308 => {
                    let confirmed = confirmed_offset(response.header("Range"));
                    debug!(confirmed, total, "Server confirmed partial content");
                    if confirmed <= offset {
                        stalls += 1;
                        if stalls > 2 {
                            return Err(Error::Upload(
                                "server is not making progress on this session".into(),
                            ));
                        }
                    } else {
                        stalls = 0;
                    }
                    // The confirmed offset never moves backwards: a Range
                    // header short of (or below) what was already confirmed
                    // only counts as a stall.
                    offset = confirmed.max(offset).min(total);
                    if offset == total {
                        // Every byte confirmed yet no completion response;
                        // ask the session for its final state instead of
                        // sending an empty range.
                        return match self.probe(&session_uri, total).await? {
                            Probe::Completed(response) => {
                                self.report(1.0);
                                Ok(self.completed_outcome(session_uri, response))
                            }
                            Probe::Incomplete(_) => Err(Error::Upload(
                                "session confirmed every byte without completing".into(),
                            )),
                        };
                    }
                }
                404 => return Err(Error::SessionExpired),
                401 => {
                    if refreshed {
                        return Err(Error::RefreshExhausted);
                    }
                    debug!("Session rejected token; refreshing");
                    self.client.auth().refresh_access_token().await?;
                    refreshed = true;
                }
                status => {
                    return Err(Error::Api {
                        status,
                        message: response.text(),
                    });
                }
            }
        }
    }

    /// One payload `PUT` from `offset` to the end.
    async fn transfer(
        &self,
        session_uri: &str,
        payload: &[u8],
        offset: u64,
        total: u64,
    ) -> Result<RawResponse> {
        let chunk = payload[offset as usize..].to_vec();
        let mut builder = self
            .client
            .http()
            .put(session_uri)
            .header("Content-Type", &self.content_type)
            .body(chunk);
        // A transfer of the whole payload needs no Content-Range.
        if offset > 0 {
            builder = builder.header("Content-Range", content_range(offset, total));
        }
        if let Some(token) = self.client.auth().access_token().await? {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// Ask the session how much it holds: zero-byte `PUT` with
    /// `Content-Range: bytes */{total}`.
    async fn probe(&self, session_uri: &str, total: u64) -> Result<Probe> {
        let mut builder = self
            .client
            .http()
            .put(session_uri)
            .header("Content-Range", content_range_probe(total))
            .body(Vec::new());
        if let Some(token) = self.client.auth().access_token().await? {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        let response = RawResponse {
            status,
            headers,
            body,
        };

        match response.status {
            308 => {
                let offset = confirmed_offset(response.header("Range"));
                debug!(offset, "Probed session offset");
                Ok(Probe::Incomplete(offset))
            }
            200 | 201 => Ok(Probe::Completed(response)),
            404 => {
                // Recoverable: the session holds nothing, so the transfer
                // starts over from byte zero.
                warn!("Session reported expired on probe; restarting from byte zero");
                Ok(Probe::Incomplete(0))
            }
            status => Err(Error::Api {
                status,
                message: response.text(),
            }),
        }
    }

    fn completed_outcome(&self, session_uri: String, response: RawResponse) -> UploadOutcome {
        let parsed = serde_json::from_slice(&response.body).ok();
        UploadOutcome {
            session_uri,
            completed: true,
            response: parsed,
        }
    }

    fn report(&self, fraction: f64) {
        if let Some(progress) = &self.progress {
            progress(fraction);
        }
    }
}

impl std::fmt::Debug for ResumableUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableUpload")
            .field("session_uri", &self.session_uri)
            .field("payload_len", &self.payload.as_ref().map(Vec::len))
            .field("resuming", &self.resuming)
            .finish()
    }
}
