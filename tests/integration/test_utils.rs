//! Test utilities for integration tests.
//!
//! This module provides a mock origin that records every fetch and helpers
//! for generating test images and driving the router.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http::header;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::sync::{Notify, RwLock};
use tower::ServiceExt;
use url::Url;

use pixel_proxy::error::OriginError;
use pixel_proxy::origin::{OriginFetcher, OriginResponse};
use pixel_proxy::pipeline::OutputOptions;
use pixel_proxy::transform::{TransformRegistry, TransformationSpec};
use pixel_proxy::{create_router, ImageService, RouterConfig};

// =============================================================================
// Mock Origin with Request Tracking
// =============================================================================

/// One recorded origin fetch.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub method: Method,

    /// Path plus query, e.g. `/cat.jpg?v=2`
    pub target: String,

    pub headers: HeaderMap,
}

/// Origin serving fixed responses by path. Unknown paths get a plain-text 404.
#[derive(Clone, Default)]
pub struct MockOrigin {
    responses: Arc<HashMap<String, OriginResponse>>,
    fail: bool,
    delay: Option<Duration>,
    fetch_count: Arc<AtomicUsize>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    fetched: Arc<Notify>,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin whose every fetch fails at the transport level.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_response(mut self, path: &str, response: OriginResponse) -> Self {
        Arc::make_mut(&mut self.responses).insert(path.to_string(), response);
        self
    }

    pub fn with_image(self, path: &str, bytes: Vec<u8>, content_type: &str) -> Self {
        self.with_response(
            path,
            OriginResponse::new(StatusCode::OK, bytes)
                .with_header(header::CONTENT_TYPE, content_type),
        )
    }

    /// Hold every response for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Resolves once a fetch has produced its response.
    pub async fn wait_for_fetch(&self) {
        self.fetched.notified().await;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub async fn fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    pub async fn fetched_targets(&self) -> Vec<String> {
        self.fetches
            .read()
            .await
            .iter()
            .map(|fetch| fetch.target.clone())
            .collect()
    }
}

#[async_trait]
impl OriginFetcher for MockOrigin {
    async fn fetch(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<OriginResponse, OriginError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        self.fetches.write().await.push(RecordedFetch {
            method: method.clone(),
            target,
            headers: headers.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail {
            Err(OriginError::Connection("connection refused".to_string()))
        } else {
            Ok(self.responses.get(url.path()).cloned().unwrap_or_else(|| {
                OriginResponse::new(StatusCode::NOT_FOUND, "not found")
                    .with_header(header::CONTENT_TYPE, "text/plain")
            }))
        };
        self.fetched.notify_one();
        result
    }
}

// =============================================================================
// Test Images
// =============================================================================

/// Create a test RGB JPEG image with a gradient pattern.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x % 256) as u8;
        let g = (y % 256) as u8;
        let b = ((x + y) % 256) as u8;
        Rgb([r, g, b])
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a test PNG image.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, 0, (y % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Decode and return `(width, height)`.
pub fn image_dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

/// Check if data is a valid JPEG (starts with SOI, ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

/// Check if data is a RIFF/WebP container.
pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

// =============================================================================
// Service and Router Setup
// =============================================================================

/// `resize` → width 640 (fit), `crop` → smart crop 100x100.
pub fn test_registry() -> TransformRegistry {
    [
        ("resize", TransformationSpec::resize(640)),
        ("crop", TransformationSpec::smart_crop(100, None)),
    ]
    .into_iter()
    .collect()
}

pub fn test_service(origin: &MockOrigin) -> ImageService {
    ImageService::new(Arc::new(origin.clone()), test_registry())
}

pub fn test_router(service: ImageService) -> Router {
    create_router(service, RouterConfig::new().with_tracing(false))
}

/// Service with WebP conversion enabled and a named PNG output format.
pub fn webp_service(origin: &MockOrigin) -> ImageService {
    test_service(origin)
        .with_auto_webp(true)
        .with_output_options(OutputOptions {
            format: Some(pixel_proxy::OutputFormat::Png),
            ..OutputOptions::default()
        })
}

// =============================================================================
// Request Helpers
// =============================================================================

/// A collected response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Every value of a repeated header such as `vary`.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Whether `vary` names `field` in any of its values.
    pub fn varies_on(&self, field: &str) -> bool {
        self.header_values("vary")
            .iter()
            .flat_map(|value| value.split(','))
            .any(|name| name.trim().eq_ignore_ascii_case(field))
    }

    pub fn cache_status(&self) -> Option<&str> {
        self.header(pixel_proxy::CACHE_STATUS_HEADER)
    }
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    accept: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    send_request(router, builder.body(Body::empty()).unwrap()).await
}

/// Send a prebuilt request and collect the response.
pub async fn send_request(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    send(router, Method::GET, uri, None).await
}
