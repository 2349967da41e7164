//! HTTP request handlers for the Pixel Proxy image API.
//!
//! Every path is an image path, so there is a single fallback handler:
//!
//! - `GET  /<directives?>/<path>` - Serve a (possibly transformed) image
//! - `HEAD /<directives?>/<path>` - Same headers, no body
//!
//! Any other method gets `405 Method Not Allowed` without touching the cache
//! or the origin.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::CACHE_STATUS_HEADER;
use crate::error::{CodecError, OriginError, ProxyError};
use crate::proxy::{ImageService, ProxyResponse};

/// Body of the `405` response.
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Only GET/HEAD allowed";

/// Host used when a request carries no usable `Host` header.
const FALLBACK_HOST: &str = "localhost";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to the handler via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,
}

impl AppState {
    pub fn new(service: ImageService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "codec_error", "origin_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert ProxyError to HTTP response.
///
/// Codec failures are the only errors this service originates (500). A
/// transport failure towards the origin becomes a 502; upstream statuses
/// never reach here, they are relayed as-is.
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ProxyError::Codec(CodecError::Decode { message }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "codec_error",
                format!("Failed to decode image: {message}"),
            ),
            ProxyError::Codec(CodecError::Encode { message }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "codec_error",
                format!("Failed to encode image: {message}"),
            ),
            ProxyError::Codec(CodecError::Task(message)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "codec_error",
                format!("Image task failed: {message}"),
            ),
            ProxyError::Origin(OriginError::InvalidUrl(message)) => (
                StatusCode::BAD_GATEWAY,
                "origin_error",
                format!("Invalid origin URL: {message}"),
            ),
            ProxyError::Origin(err) => (
                StatusCode::BAD_GATEWAY,
                "origin_error",
                format!("Origin request failed: {err}"),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle every inbound request.
///
/// # Response Headers
///
/// - `Content-Type`, `Content-Length`: of the (re-encoded) body
/// - `X-Cache-Status`: `HIT` or `MISS`
/// - `Vary: Accept` when automatic WebP conversion is enabled
pub async fn image_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        warn!(method = %method, path = uri.path(), "Rejected non-read method");
        return method_not_allowed();
    }

    let url = match request_url(&uri, &headers) {
        Ok(url) => url,
        Err(e) => {
            warn!(uri = %uri, "Unparseable request URL: {}", e);
            let status = StatusCode::BAD_REQUEST;
            let body = ErrorResponse::with_status("invalid_request", e.to_string(), status);
            return (status, Json(body)).into_response();
        }
    };

    match state.service.handle(&method, &url, &headers).await {
        Ok(response) => {
            debug!(
                url = %url,
                status = %response.status,
                cache = response.cache_status.as_str(),
                bytes = response.body.len(),
                "Served image request"
            );
            into_http_response(response, method == Method::HEAD)
        }
        Err(e) => e.into_response(),
    }
}

/// `405` with an `Allow` header and a plain-text explanation.
pub fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "GET, HEAD")],
        METHOD_NOT_ALLOWED_MESSAGE,
    )
        .into_response()
}

/// Absolute URL of an inbound request: `http://{host}{path}?{query}`.
pub fn request_url(uri: &Uri, headers: &HeaderMap) -> Result<Url, url::ParseError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .filter(|host| is_plain_host(host))
        .unwrap_or(FALLBACK_HOST);
    let path = uri
        .path_and_query()
        .map(|path_and_query| path_and_query.as_str())
        .unwrap_or("/");

    Url::parse(&format!("http://{host}{path}"))
}

/// Whether a `Host` value cannot change the meaning of the URL built
/// around it.
fn is_plain_host(host: &str) -> bool {
    !host.is_empty() && !host.contains(['/', '@', '?', '#', '\\'])
}

fn into_http_response(response: ProxyResponse, head: bool) -> Response {
    let body = if head {
        Body::empty()
    } else {
        Body::from(response.body)
    };

    let mut http_response = Response::new(body);
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;
    http_response.headers_mut().insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(response.cache_status.as_str()),
    );
    http_response
}

// =============================================================================
// Tests
// =============================================================================
