//! Presigned-URL request signing
//!
//! Canonical string to sign (line-delimited):
//! ```text
//! VERB
//! <empty content-type placeholder>
//! <empty content-MD5 placeholder>
//! <expires, epoch seconds>
//! [x-amz-security-token:<token>]
//! /bucket/key[?versionId=...]
//! ```
//! signed with HMAC-SHA1 over the caller's secret key and base64-encoded.
//! Deterministic for identical inputs, which the verifying server (and the
//! tests) depend on.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use lode_core::types::ObjectRef;
use lode_core::{LodeError, LodeResult};

type HmacSha1 = Hmac<Sha1>;

const DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Caller credentials for request signing.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    secret_access_key: String,
    /// Temporary-session token, forwarded as `x-amz-security-token`.
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.is_some())
            .finish()
    }
}

/// When a presigned URL stops being honored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Absolute epoch seconds.
    At(u64),
    /// Seconds from the moment of signing.
    In(u64),
    /// One hour from the moment of signing.
    Default,
}

impl Expiry {
    /// Accepts an integer (seconds from now) or an RFC 3339 / RFC 2822
    /// date string (absolute).
    pub fn parse(s: &str) -> LodeResult<Self> {
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Expiry::In(secs));
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return Ok(Expiry::At(dt.timestamp().max(0) as u64));
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
            return Ok(Expiry::At(dt.timestamp().max(0) as u64));
        }
        Err(LodeError::Other(anyhow::anyhow!(
            "unparseable expiry: {s:?}"
        )))
    }

    /// Coerce to absolute epoch seconds.
    pub fn resolve(&self, now: SystemTime) -> u64 {
        let epoch = |t: SystemTime| {
            t.duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs()
        };
        match self {
            Expiry::At(secs) => *secs,
            Expiry::In(secs) => epoch(now) + secs,
            Expiry::Default => epoch(now) + DEFAULT_EXPIRY_SECS,
        }
    }
}

impl From<SystemTime> for Expiry {
    fn from(t: SystemTime) -> Self {
        Expiry::At(
            t.duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        )
    }
}

impl From<Duration> for Expiry {
    fn from(d: Duration) -> Self {
        Expiry::In(d.as_secs())
    }
}

/// A signed, time-limited authorization for one operation on one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedRequest {
    pub url: String,
    pub expires: u64,
    pub signature: String,
}

/// Canonicalized resource path: `/bucket/key` plus the relevant
/// sub-resource query.
pub fn canonical_resource(target: &ObjectRef) -> String {
    let mut resource = format!("/{}/{}", target.bucket, target.key);
    if let Some(version) = &target.version_id {
        resource.push_str("?versionId=");
        resource.push_str(version);
    }
    resource
}

/// The line-delimited canonical string covered by the signature.
pub fn string_to_sign(
    verb: &str,
    expires: u64,
    session_token: Option<&str>,
    resource: &str,
) -> String {
    let mut s = format!("{verb}\n\n\n{expires}\n");
    if let Some(token) = session_token {
        s.push_str("x-amz-security-token:");
        s.push_str(token);
        s.push('\n');
    }
    s.push_str(resource);
    s
}

/// base64(HMAC-SHA1(secret, string_to_sign)).
pub fn compute_signature(secret: &str, to_sign: &str) -> LodeResult<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("HMAC init: {e}"))?;
    mac.update(to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Mint a presigned URL for `verb` on `target`, valid until `expiry`.
pub fn presign(
    credentials: &Credentials,
    verb: &str,
    endpoint: &str,
    target: &ObjectRef,
    expiry: Expiry,
) -> LodeResult<PresignedRequest> {
    presign_at(credentials, verb, endpoint, target, expiry, SystemTime::now())
}

/// Like [`presign`] but with an explicit clock, for reproducibility.
pub fn presign_at(
    credentials: &Credentials,
    verb: &str,
    endpoint: &str,
    target: &ObjectRef,
    expiry: Expiry,
    now: SystemTime,
) -> LodeResult<PresignedRequest> {
    let expires = expiry.resolve(now);
    let resource = canonical_resource(target);
    let to_sign = string_to_sign(verb, expires, credentials.session_token.as_deref(), &resource);
    let signature = compute_signature(&credentials.secret_access_key, &to_sign)?;

    let mut url = format!(
        "{}/{}/{}?AWSAccessKeyId={}&Expires={}&Signature={}",
        endpoint.trim_end_matches('/'),
        target.bucket,
        target.key,
        query_escape(&credentials.access_key_id),
        expires,
        query_escape(&signature),
    );
    if let Some(version) = &target.version_id {
        url.push_str("&versionId=");
        url.push_str(&query_escape(version));
    }
    if let Some(token) = &credentials.session_token {
        url.push_str("&x-amz-security-token=");
        url.push_str(&query_escape(token));
    }

    Ok(PresignedRequest {
        url,
        expires,
        signature,
    })
}

/// Percent-encode a query value. Signatures carry `+`, `/`, and `=` from
/// base64, all of which are reserved in queries.
fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
