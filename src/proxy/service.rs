//! Image service for orchestrating proxied requests.
//!
//! The ImageService is the main entry point for image requests:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImageService                             │
//! │  handle()                                                         │
//! │   1. Parse directives      5. Pass through non-images             │
//! │   2. Negotiate WebP        6. Run pipeline (blocking pool)        │
//! │   3. Output cache lookup   7. Rewrite headers                     │
//! │   4. Origin (cache-aside)  8. Store output, return MISS           │
//! │        │              │                 │                │        │
//! │        ▼              ▼                 ▼                ▼        │
//! │ DirectiveParser  ResponseCache    OriginFetcher   PipelineExecutor│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent misses for the same key each fetch and transform on their
//! own; there is no request coalescing. Dropping the `handle` future stops
//! the flow at its next await point, so a cancelled request never reaches
//! the cache write.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::cache::{derive_cache_key, CacheEntry, CacheStatus, MemoryCacheStore, ResponseCache};
use crate::config::ServiceOptions;
use crate::error::{ConfigError, ProxyError};
use crate::origin::{forwardable_headers, media_type, HttpOrigin, OriginFetcher, OriginResponse};
use crate::pipeline::{EncodedImage, OutputFormat, OutputOptions, PipelineExecutor};
use crate::request::{ContentNegotiator, DirectiveParser, PathDirectiveParser, RequestContext};
use crate::transform::TransformRegistry;

/// Origin response headers that never survive proxying.
///
/// `set-cookie` is per-client state and must not be replayed from the
/// shared cache.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "trailer",
    "upgrade",
    "set-cookie",
];

// =============================================================================
// Proxy Response
// =============================================================================

/// Response from the image service.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,

    /// Headers to send, without the cache status marker
    pub headers: HeaderMap,

    pub body: Bytes,

    /// HIT/MISS marker attached to the response
    pub cache_status: CacheStatus,
}

impl ProxyResponse {
    fn from_entry(entry: CacheEntry) -> Self {
        Self {
            status: StatusCode::OK,
            headers: entry.headers,
            body: entry.bytes,
            cache_status: CacheStatus::Hit,
        }
    }

    fn pass_through(origin: OriginResponse) -> Self {
        let mut headers = origin.headers;
        strip_response_headers(&mut headers);
        set_content_length(&mut headers, origin.body.len());
        Self {
            status: origin.status,
            headers,
            body: origin.body,
            cache_status: CacheStatus::Miss,
        }
    }
}

// =============================================================================
// Image Service
// =============================================================================

/// Service that fetches, transforms and caches images.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use pixel_proxy::origin::HttpOrigin;
/// use pixel_proxy::proxy::ImageService;
/// use pixel_proxy::transform::{TransformRegistry, TransformationSpec};
///
/// let registry: TransformRegistry = [("thumb", TransformationSpec::resize(200))]
///     .into_iter()
///     .collect();
/// let origin = Arc::new(HttpOrigin::new("https://images.example.com")?);
/// let service = ImageService::new(origin, registry);
///
/// let url = "http://localhost/thumb/cat.jpg".parse()?;
/// let response = service.handle(&Method::GET, &url, &HeaderMap::new()).await?;
/// ```
#[derive(Clone)]
pub struct ImageService {
    registry: Arc<TransformRegistry>,
    parser: Arc<dyn DirectiveParser>,
    negotiator: ContentNegotiator,
    cache: ResponseCache,
    origin: Arc<dyn OriginFetcher>,
    executor: PipelineExecutor,
}

impl ImageService {
    /// Create a service with an in-memory cache, no root prefix and
    /// automatic WebP conversion disabled.
    pub fn new(origin: Arc<dyn OriginFetcher>, registry: TransformRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            parser: Arc::new(PathDirectiveParser::new()),
            negotiator: ContentNegotiator::new(false),
            cache: ResponseCache::new(Arc::new(MemoryCacheStore::new())),
            origin,
            executor: PipelineExecutor::default(),
        }
    }

    /// Build a service from structured options.
    ///
    /// An injected `origin` takes precedence over `options.origin_url`.
    pub fn from_options(
        options: ServiceOptions,
        origin: Option<Arc<dyn OriginFetcher>>,
    ) -> Result<Self, ConfigError> {
        let origin: Arc<dyn OriginFetcher> = match (origin, options.origin_url.as_deref()) {
            (Some(origin), _) => origin,
            (None, Some(base)) => Arc::new(
                HttpOrigin::with_timeouts(
                    base,
                    options.origin_connect_timeout(),
                    options.origin_timeout(),
                )
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "an origin URL or origin fetcher is required".to_string(),
                ))
            }
        };

        let registry = TransformRegistry::new(options.transformations.clone())?;
        let store = MemoryCacheStore::with_capacity(options.cache_capacity);
        let cache = ResponseCache::new(Arc::new(store))
            .with_origin_ttl(options.origin_ttl())
            .with_output_ttl(options.output_ttl());

        let mut service = Self::new(origin, registry)
            .with_cache(cache)
            .with_auto_webp(options.auto_webp)
            .with_output_options(options.output);
        if let Some(root) = options.root_path.as_deref() {
            service = service.with_parser(Arc::new(PathDirectiveParser::with_root(root)));
        }

        info!(
            directives = service.registry.len(),
            auto_webp = options.auto_webp,
            root = options.root_path.as_deref().unwrap_or("/"),
            "image service configured"
        );
        Ok(service)
    }

    /// Replace the URL parser.
    pub fn with_parser(mut self, parser: Arc<dyn DirectiveParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace the response cache (and with it the backing store).
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    /// Enable or disable automatic WebP conversion.
    pub fn with_auto_webp(mut self, enabled: bool) -> Self {
        self.negotiator = ContentNegotiator::new(enabled);
        self
    }

    /// Set the output encoding options.
    pub fn with_output_options(mut self, output: OutputOptions) -> Self {
        self.executor = PipelineExecutor::new(output);
        self
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Interpret an inbound request.
    pub fn context(&self, method: &Method, url: &Url, headers: &HeaderMap) -> RequestContext {
        let parsed = self.parser.parse(url, &self.registry);
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok());
        let webp = self.negotiator.allows(&parsed.forward_url, accept);

        RequestContext {
            method: method.clone(),
            url: url.clone(),
            forward_url: parsed.forward_url,
            accept: accept.map(str::to_string),
            webp,
            transforms: parsed.transforms,
        }
    }

    /// Serve one request.
    ///
    /// Method filtering is the caller's job; HEAD runs the same flow as GET.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::Codec`] when bytes that sniff as an image fail to
    ///   decode or encode
    /// - [`ProxyError::Origin`] when the origin cannot be reached at all
    pub async fn handle(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<ProxyResponse, ProxyError> {
        let ctx = self.context(method, url, headers);
        let cache_key = derive_cache_key(&ctx.forward_url, &ctx.transforms, ctx.webp);

        if let (Some(entry), _) = self.cache.get_output(&cache_key).await {
            debug!(key = %cache_key, "serving cached output");
            return Ok(ProxyResponse::from_entry(entry));
        }

        let origin = self.fetch_origin(&ctx, headers).await?;

        if origin.status != StatusCode::OK || !is_transformable(&origin.headers) {
            debug!(
                url = %ctx.forward_url,
                status = %origin.status,
                content_type = origin.content_type().as_deref().unwrap_or("-"),
                "passing origin response through"
            );
            return Ok(ProxyResponse::pass_through(origin));
        }

        if !self.executor.needs_processing(&ctx.transforms, ctx.webp) {
            let mut headers = origin.headers;
            strip_response_headers(&mut headers);
            set_content_length(&mut headers, origin.body.len());
            return Ok(self
                .store_output(&cache_key, &ctx, origin.body, headers)
                .await);
        }

        let encoded = self
            .executor
            .execute_blocking(origin.body.clone(), ctx.transforms.clone(), ctx.webp)
            .await?;

        let Some(encoded) = encoded else {
            return Ok(ProxyResponse::pass_through(origin));
        };

        let headers = transformed_headers(origin.headers, &encoded);
        Ok(self
            .store_output(&cache_key, &ctx, encoded.bytes, headers)
            .await)
    }

    /// Drop the origin bytes and every output variant of `url`.
    pub async fn purge(&self, url: &Url) -> usize {
        let parsed = self.parser.parse(url, &self.registry);
        self.cache.purge(&parsed.forward_url).await
    }

    /// Origin bytes for a request, through the origin cache.
    ///
    /// Only complete image responses are cached; errors and non-200 statuses
    /// always go back to the origin on the next request.
    async fn fetch_origin(
        &self,
        ctx: &RequestContext,
        headers: &HeaderMap,
    ) -> Result<OriginResponse, ProxyError> {
        if let Some(entry) = self.cache.get_origin(&ctx.forward_url).await {
            return Ok(OriginResponse {
                status: StatusCode::OK,
                headers: entry.headers,
                body: entry.bytes,
            });
        }

        // Always GET: HEAD requests still need the body to fill the caches.
        let mut response = self
            .origin
            .fetch(&Method::GET, &ctx.forward_url, &forwardable_headers(headers))
            .await?;
        debug!(
            url = %ctx.forward_url,
            status = %response.status,
            bytes = response.body.len(),
            "fetched from origin"
        );
        strip_response_headers(&mut response.headers);

        if response.status == StatusCode::OK && is_transformable(&response.headers) {
            self.cache
                .set_origin(
                    &ctx.forward_url,
                    response.body.clone(),
                    response.headers.clone(),
                )
                .await;
        }

        Ok(response)
    }

    async fn store_output(
        &self,
        cache_key: &str,
        ctx: &RequestContext,
        body: Bytes,
        mut headers: HeaderMap,
    ) -> ProxyResponse {
        // Every variant of a convertible URL varies, including the original
        if self.negotiator.varies_on_accept(&ctx.forward_url) {
            add_vary_accept(&mut headers);
        }

        self.cache
            .set_output(cache_key, &ctx.forward_url, body.clone(), headers.clone())
            .await;

        ProxyResponse {
            status: StatusCode::OK,
            headers,
            body,
            cache_status: CacheStatus::Miss,
        }
    }
}

fn is_transformable(headers: &HeaderMap) -> bool {
    media_type(headers)
        .as_deref()
        .and_then(OutputFormat::from_content_type)
        .is_some()
}

fn strip_response_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(*name);
    }
}

/// Rewrite origin headers to describe a re-encoded body.
fn transformed_headers(mut headers: HeaderMap, encoded: &EncodedImage) -> HeaderMap {
    let source = media_type(&headers)
        .as_deref()
        .and_then(OutputFormat::from_content_type);
    if source != Some(encoded.format) {
        // A filename like cat.jpg would mislabel the new body
        headers.remove(header::CONTENT_DISPOSITION);
    }

    strip_response_headers(&mut headers);
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::ETAG);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(encoded.format.content_type()),
    );
    set_content_length(&mut headers, encoded.bytes.len());
    headers
}

fn add_vary_accept(headers: &mut HeaderMap) {
    let present = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|name| {
            let name = name.trim();
            name == "*" || name.eq_ignore_ascii_case("accept")
        });
    if !present {
        headers.append(header::VARY, HeaderValue::from_static("Accept"));
    }
}

fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
