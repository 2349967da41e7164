//! HTTP origin: forwards requests to a base URL.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use tracing::debug;
use url::Url;

use super::{OriginFetcher, OriginResponse};
use crate::error::OriginError;

/// Default time allowed to establish a connection to the origin.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for a complete origin response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Origin reached over HTTP(S) at a base URL.
///
/// The forward path is resolved relative to the base, so a base of
/// `https://s3.amazonaws.com/bucket/` maps `/cat.jpg` to
/// `https://s3.amazonaws.com/bucket/cat.jpg`.
///
/// # Example
///
/// ```ignore
/// use pixel_proxy::origin::HttpOrigin;
///
/// let origin = HttpOrigin::new("https://s3.amazonaws.com/my-images/")?;
/// ```
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base: Url,
}

impl HttpOrigin {
    /// Create an origin with default timeouts.
    pub fn new(base: &str) -> Result<Self, OriginError> {
        Self::with_timeouts(base, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create an origin with explicit connect and request timeouts.
    pub fn with_timeouts(
        base: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| OriginError::Connection(e.to_string()))?;
        Self::with_client(client, base)
    }

    /// Create an origin around an existing client.
    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self, OriginError> {
        Ok(Self {
            client,
            base: parse_base(base)?,
        })
    }

    /// The normalized base URL (always ends with `/`).
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Map a forward URL onto the origin base, keeping path and query.
    pub fn target_url(&self, forward_url: &Url) -> Result<Url, OriginError> {
        // "./" keeps a segment like "c:d.jpg" from parsing as a scheme
        let relative = format!("./{}", forward_url.path().trim_start_matches('/'));
        let mut target = self
            .base
            .join(&relative)
            .map_err(|e| OriginError::InvalidUrl(format!("{forward_url}: {e}")))?;
        target.set_query(forward_url.query());
        Ok(target)
    }
}

fn parse_base(base: &str) -> Result<Url, OriginError> {
    let mut url = Url::parse(base).map_err(|e| OriginError::InvalidUrl(format!("{base}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(OriginError::InvalidUrl(format!(
            "{base}: not usable as a base URL"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[async_trait]
impl OriginFetcher for HttpOrigin {
    async fn fetch(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<OriginResponse, OriginError> {
        let target = self.target_url(url)?;
        debug!(method = %method, target = %target, "fetching from origin");

        let response = self
            .client
            .request(method.clone(), target)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| OriginError::Connection(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| OriginError::Connection(e.to_string()))?;

        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}
