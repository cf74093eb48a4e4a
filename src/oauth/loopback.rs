//! One-shot loopback callback listener.
//!
//! Binds an OS-assigned port on `127.0.0.1`, accepts exactly one HTTP
//! request (the browser redirect carrying `code` and `state`), answers with
//! a fixed confirmation page and tears the socket down, regardless of
//! outcome. Dropping the accept future closes the listener, which makes the
//! wait cancellable.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::debug;

use super::callback::{CallbackParams, ERROR_HTML, SUCCESS_HTML};
use crate::error::{Error, Result};

/// Upper bound on the redirect request we are willing to buffer.
const MAX_REQUEST_BYTES: usize = 16 * 1024;

/// A bound loopback listener awaiting a single authorization callback.
pub struct LoopbackListener {
    listener: TcpListener,
    port: u16,
}

impl LoopbackListener {
    /// Bind to `127.0.0.1` on an OS-assigned free port.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| Error::AuthFlow(format!("loopback bind failed: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::AuthFlow(format!("loopback local_addr failed: {e}")))?
            .port();
        debug!(port, "Loopback listener bound");
        Ok(Self { listener, port })
    }

    /// The OS-assigned port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept exactly one connection, parse the redirect's query string and
    /// respond with the confirmation page. Consumes the listener; the
    /// socket is closed when this returns.
    pub async fn accept_callback(self) -> Result<CallbackParams> {
        let (mut stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::AuthFlow(format!("loopback accept failed: {e}")))?;
        debug!(%peer, "Authorization callback connection accepted");

        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];
        // Read until the end of the request head; the redirect is a GET and
        // carries no body we care about.
        loop {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::AuthFlow(format!("loopback read failed: {e}")))?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
                break;
            }
        }

        let head = String::from_utf8_lossy(&buf);
        let params = parse_request_line(&head);

        let page = match &params {
            Ok(p) if p.error.is_none() => SUCCESS_HTML,
            _ => ERROR_HTML,
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            page.len(),
            page
        );
        // Best-effort: the flow outcome does not depend on the browser
        // seeing the page.
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;

        params
    }
}

/// Extract the query-string parameters from an HTTP request head.
fn parse_request_line(head: &str) -> Result<CallbackParams> {
    let request_line = head
        .lines()
        .next()
        .ok_or_else(|| Error::AuthFlow("empty callback request".into()))?;

    // "GET /?code=...&state=... HTTP/1.1"
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::AuthFlow("malformed callback request line".into()))?;

    let query = target.splitn(2, '?').nth(1).unwrap_or_default();
    Ok(CallbackParams::parse_query(query))
}
