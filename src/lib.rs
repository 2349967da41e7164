//! # Pixel Proxy
//!
//! An image transformation proxy. Requests name transforms in their first
//! path segment; the proxy fetches the original from an HTTP or S3 origin,
//! applies the transforms and caches both the original and the result.
//!
//! ```text
//! GET /thumb,square/products/cat.jpg
//!      └────┬─────┘ └──────┬───────┘
//!      directives     origin path
//! ```
//!
//! ## Features
//!
//! - **Named transforms**: resize (fit / scale / limit) and crop (anchored or
//!   entropy-based smart crop), configured once as a JSON table
//! - **Format negotiation**: optional WebP conversion driven by `Accept`
//! - **Two-scope caching**: original bytes and transformed outputs, with
//!   tag-based purge per source URL
//! - **Pluggable origins**: HTTP base URL, S3 bucket, or any
//!   [`OriginFetcher`](origin::OriginFetcher)
//!
//! ## Architecture
//!
//! - [`transform`] - Transform specs and the named registry
//! - [`request`] - Directive parsing and content negotiation
//! - [`cache`] - Cache keys, the cache store and the response cache gateway
//! - [`origin`] - Origin fetchers (HTTP, S3)
//! - [`pipeline`] - Decode, transform and encode
//! - [`proxy`] - Request orchestration
//! - [`server`] - Axum-based HTTP façade
//! - [`config`] - CLI and structured service options
//!
//! ## Example
//!
//! ```rust,no_run
//! use pixel_proxy::{create_router, ImageService, RouterConfig, ServiceOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServiceOptions::from_json(
//!         r#"{
//!             "origin_url": "https://assets.example.com",
//!             "auto_webp": true,
//!             "transformations": {
//!                 "thumb": {"type": "resize", "width": 200}
//!             }
//!         }"#,
//!     )
//!     .unwrap();
//!
//!     let service = ImageService::from_options(options, None).unwrap();
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod origin;
pub mod pipeline;
pub mod proxy;
pub mod request;
pub mod server;
pub mod transform;

// Re-export commonly used types
pub use cache::{CacheStatus, CacheStore, MemoryCacheStore, ResponseCache, CACHE_STATUS_HEADER};
pub use config::{Config, ServiceOptions};
pub use error::{CodecError, ConfigError, OriginError, ProxyError};
pub use origin::{HttpOrigin, OriginFetcher, OriginResponse, S3Origin};
pub use pipeline::{OutputFormat, OutputOptions, PipelineExecutor};
pub use proxy::{ImageService, ProxyResponse};
pub use request::{DirectiveParser, PathDirectiveParser};
pub use server::{create_router, AppState, RouterConfig};
pub use transform::{TransformEntry, TransformRegistry, TransformationSpec};
