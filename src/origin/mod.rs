//! Origin access.
//!
//! The origin is an opaque capability from `(method, url, headers)` to a
//! status/headers/body response. Two implementations ship with the crate:
//!
//! - [`HttpOrigin`] proxies to a base URL (any HTTP object store or web server)
//! - [`S3Origin`] reads objects from an S3 bucket via the AWS SDK
//!
//! Anything else (tests, custom routing) implements [`OriginFetcher`].

mod http_origin;
mod s3;

pub use http_origin::{HttpOrigin, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use s3::{create_s3_client, S3Origin};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, Method, StatusCode};
use url::Url;

use crate::error::OriginError;

/// Response from an origin.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OriginResponse {
    /// Create a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Builder-style header setter; invalid values are skipped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    /// The media type of the body, lowercased and without parameters.
    pub fn content_type(&self) -> Option<String> {
        media_type(&self.headers)
    }
}

/// Capability to fetch a forward URL from the origin.
///
/// Timeouts and cancellation are the implementation's concern.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<OriginResponse, OriginError>;
}

/// Request headers that are never forwarded to the origin.
///
/// Conditional and range headers would turn a cacheable full 200 into a
/// 304/206, and the body must arrive uncompressed for decoding. Credentials
/// are dropped because responses are cached by URL and shared across clients.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "authorization",
    "cookie",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authorization",
    "accept-encoding",
    "range",
    "if-match",
    "if-none-match",
    "if-modified-since",
    "if-unmodified-since",
    "if-range",
    "content-length",
];

/// Copy the inbound headers that may be sent to the origin.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in STRIPPED_REQUEST_HEADERS {
        forwarded.remove(*name);
    }
    forwarded
}

/// Media type of a header map's `content-type`, e.g. `image/jpeg`.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let media = value.split(';').next()?.trim().to_ascii_lowercase();
    if media.is_empty() {
        None
    } else {
        Some(media)
    }
}
