//! S3-backed origin.
//!
//! Maps the forward path onto an object key within a bucket and reads the
//! whole object. A missing object becomes a plain `404` response so the
//! service relays it like any other upstream failure.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use tracing::debug;
use url::Url;

use super::{OriginFetcher, OriginResponse};
use crate::error::OriginError;

/// Origin serving objects from an S3 or S3-compatible bucket.
///
/// # Example
///
/// ```ignore
/// use pixel_proxy::origin::{create_s3_client, S3Origin};
///
/// let client = create_s3_client(None, "us-east-1").await;
/// let origin = S3Origin::new(client, "my-images").with_prefix("public/");
///
/// // GET /cat.jpg reads s3://my-images/public/cat.jpg
/// ```
#[derive(Clone)]
pub struct S3Origin {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Origin {
    /// Create an origin for the given bucket.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
        }
    }

    /// Prepend `prefix` to every object key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for a forward URL (percent-decoded path, prefix applied).
    pub fn object_key(&self, forward_url: &Url) -> Result<String, OriginError> {
        let path = forward_url.path().trim_start_matches('/');
        let decoded = urlencoding::decode(path)
            .map_err(|e| OriginError::InvalidUrl(format!("{forward_url}: {e}")))?;
        if decoded.is_empty() {
            return Err(OriginError::InvalidUrl(format!(
                "{forward_url}: empty object key"
            )));
        }
        Ok(format!("{}{}", self.prefix, decoded))
    }
}

#[async_trait]
impl OriginFetcher for S3Origin {
    async fn fetch(
        &self,
        method: &Method,
        url: &Url,
        _headers: &HeaderMap,
    ) -> Result<OriginResponse, OriginError> {
        let key = self.object_key(url)?;
        debug!(method = %method, bucket = %self.bucket, key = %key, "fetching from S3");

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if is_not_found {
                    return Ok(OriginResponse::new(StatusCode::NOT_FOUND, Bytes::new()));
                }

                // Relay S3's own HTTP status (403, 404, ...) when there is one
                let status = e
                    .raw_response()
                    .and_then(|r| StatusCode::from_u16(r.status().as_u16()).ok());
                if let Some(status) = status {
                    return Ok(OriginResponse::new(status, Bytes::new()));
                }

                return Err(OriginError::S3(e.to_string()));
            }
        };

        let mut response = OriginResponse::new(StatusCode::OK, Bytes::new());
        if let Some(content_type) = output.content_type() {
            response = response.with_header(header::CONTENT_TYPE, content_type);
        }
        if let Some(etag) = output.e_tag() {
            response = response.with_header(header::ETAG, etag);
        }
        if let Some(cache_control) = output.cache_control() {
            response = response.with_header(header::CACHE_CONTROL, cache_control);
        }

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| OriginError::S3(e.to_string()))?;
        response.body = body.into_bytes();

        Ok(response)
    }
}

/// Create an S3 client with optional custom endpoint.
///
/// For S3-compatible services like MinIO, provide a custom endpoint:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // For S3-compatible services, we often need to use path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
