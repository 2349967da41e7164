//! Pixel Proxy - an image transformation proxy.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixel_proxy::{
    config::Config,
    origin::{create_s3_client, OriginFetcher, S3Origin},
    proxy::ImageService,
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = match config.service_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    match (&config.origin_url, &config.s3_bucket) {
        (Some(url), _) => info!("  Origin: {}", url),
        (None, Some(bucket)) => {
            info!("  Origin: s3://{}/{}", bucket, config.s3_prefix.as_deref().unwrap_or(""));
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);
        }
        (None, None) => {}
    }
    info!("  Directives: {}", options.transformations.len());
    info!("  Auto WebP: {}", options.auto_webp);
    info!(
        "  Cache: {}MB, origin TTL {}s, output TTL {}s",
        options.cache_capacity / (1024 * 1024),
        options.origin_ttl_secs,
        options.output_ttl_secs
    );

    let origin = build_s3_origin(&config).await;

    let service = match ImageService::from_options(options, origin) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to configure image service: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// S3 origin when a bucket is configured; HTTP origins are built from the
/// service options.
async fn build_s3_origin(config: &Config) -> Option<Arc<dyn OriginFetcher>> {
    let bucket = config.s3_bucket.as_ref()?;
    let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

    let mut origin = S3Origin::new(client, bucket.clone());
    if let Some(ref prefix) = config.s3_prefix {
        origin = origin.with_prefix(prefix.clone());
    }
    Some(Arc::new(origin))
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pixel_proxy=debug,tower_http=debug"
    } else {
        "pixel_proxy=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the command-line configuration.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
