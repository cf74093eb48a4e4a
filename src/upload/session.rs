//! Resumable-session wire helpers.
//!
//! The resumable protocol speaks through two headers:
//!
//! - `Content-Range: bytes {first}-{last}/{total}` on upload `PUT`s, or
//!   `bytes */{total}` when probing for the confirmed offset;
//! - `Range: bytes=0-{upper}` on `308 Resume Incomplete` responses, naming
//!   the last byte the server has durably received.

/// Parse the upper bound out of a `308` `Range` header (`bytes=0-599`).
///
/// `None` when the header is absent or malformed, which the protocol
/// defines as "nothing received yet".
pub fn parse_range_upper(range: &str) -> Option<u64> {
    let idx = range.rfind('-')?;
    range[idx + 1..].trim().parse().ok()
}

/// Confirmed offset (next byte to send) implied by an optional `Range`
/// header value.
pub fn confirmed_offset(range: Option<&str>) -> u64 {
    range
        .and_then(parse_range_upper)
        .map(|upper| upper + 1)
        .unwrap_or(0)
}

/// `Content-Range` value for uploading `[offset, total)`.
pub fn content_range(offset: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, total.saturating_sub(1), total)
}

/// `Content-Range` value for a status probe.
pub fn content_range_probe(total: u64) -> String {
    format!("bytes */{total}")
}

/// Overall progress in `[0, 1]`, blending the server-confirmed fraction
/// with how far the current attempt has pushed into the unconfirmed
/// remainder.
pub fn blended_progress(confirmed: u64, total: u64, attempt_fraction: f64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    let base = confirmed as f64 / total as f64;
    (base + attempt_fraction.clamp(0.0, 1.0) * (1.0 - base)).clamp(0.0, 1.0)
}
