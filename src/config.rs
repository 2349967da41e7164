//! Configuration management for Pixel Proxy.
//!
//! Two layers:
//! - [`Config`]: command-line arguments and `PIXEL_`-prefixed environment
//!   variables, parsed with clap
//! - [`ServiceOptions`]: the structured options the image service is built
//!   from; every field has a default and unknown keys are ignored
//!
//! # Example
//!
//! ```ignore
//! use pixel_proxy::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! let options = config.service_options()?;
//! ```
//!
//! # Environment Variables
//!
//! - `PIXEL_HOST` - Server bind address (default: 0.0.0.0)
//! - `PIXEL_PORT` - Server port (default: 3000)
//! - `PIXEL_ORIGIN_URL` - Base URL of an HTTP origin
//! - `PIXEL_S3_BUCKET` - S3 bucket used as origin
//! - `PIXEL_S3_PREFIX` - Key prefix inside the bucket
//! - `PIXEL_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PIXEL_S3_REGION` - AWS region (default: us-east-1)
//! - `PIXEL_ORIGIN_CONNECT_TIMEOUT` - HTTP origin connect timeout in seconds (default: 5)
//! - `PIXEL_ORIGIN_TIMEOUT` - HTTP origin request timeout in seconds (default: 30)
//! - `PIXEL_ROOT_PATH` - Path prefix stripped before directive parsing
//! - `PIXEL_TRANSFORMS` - JSON file with the named transformation table
//! - `PIXEL_AUTO_WEBP` - Convert to WebP when the client accepts it
//! - `PIXEL_OUTPUT_FORMAT` - Encode every processed image to this format
//! - `PIXEL_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `PIXEL_PNG_COMPRESSION` - fast, default or best
//! - `PIXEL_ORIGIN_TTL` - Origin cache TTL in seconds (default: 86400)
//! - `PIXEL_OUTPUT_TTL` - Output cache TTL in seconds (default: 3600)
//! - `PIXEL_CACHE_CAPACITY` - Cache size in bytes (default: 256MB)
//! - `PIXEL_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_ORIGIN_TTL, DEFAULT_OUTPUT_TTL};
use crate::error::ConfigError;
use crate::origin::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::pipeline::{
    JpegOptions, OutputFormat, OutputOptions, PngCompression, PngOptions, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
use crate::transform::TransformEntry;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

// =============================================================================
// Service Options
// =============================================================================

/// Structured configuration for [`ImageService`](crate::proxy::ImageService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Path prefix stripped before directive parsing (e.g. `/images`)
    pub root_path: Option<String>,

    /// Directive name to transform entry
    pub transformations: HashMap<String, TransformEntry>,

    /// Convert to WebP when the client accepts it
    pub auto_webp: bool,

    /// Named output format and per-format encode options
    pub output: OutputOptions,

    /// Base URL of an HTTP origin; ignored when a fetcher is injected
    pub origin_url: Option<String>,

    /// HTTP origin timeouts in seconds
    pub origin_connect_timeout_secs: u64,
    pub origin_timeout_secs: u64,

    pub origin_ttl_secs: u64,
    pub output_ttl_secs: u64,

    /// Cache size in bytes
    pub cache_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            root_path: None,
            transformations: HashMap::new(),
            auto_webp: false,
            output: OutputOptions::default(),
            origin_url: None,
            origin_connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            origin_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            origin_ttl_secs: DEFAULT_ORIGIN_TTL.as_secs(),
            output_ttl_secs: DEFAULT_OUTPUT_TTL.as_secs(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ServiceOptions {
    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn origin_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_connect_timeout_secs)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }

    pub fn origin_ttl(&self) -> Duration {
        Duration::from_secs(self.origin_ttl_secs)
    }

    pub fn output_ttl(&self) -> Duration {
        Duration::from_secs(self.output_ttl_secs)
    }
}

/// Read a JSON transformation table from disk.
pub fn load_transformations(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, TransformEntry>, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pixel Proxy - an image transformation proxy.
///
/// Fetches images from an HTTP or S3 origin, applies the transforms named in
/// the request path and caches both the originals and the results.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixel-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PIXEL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PIXEL_PORT")]
    pub port: u16,

    // =========================================================================
    // Origin Configuration
    // =========================================================================
    /// Base URL of the HTTP origin (e.g. https://assets.example.com/media).
    #[arg(long, env = "PIXEL_ORIGIN_URL")]
    pub origin_url: Option<String>,

    /// S3 bucket used as origin instead of an HTTP server.
    #[arg(long, env = "PIXEL_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix prepended to request paths inside the bucket.
    #[arg(long, env = "PIXEL_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PIXEL_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PIXEL_S3_REGION")]
    pub s3_region: String,

    /// Seconds allowed to connect to the HTTP origin.
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs(),
        env = "PIXEL_ORIGIN_CONNECT_TIMEOUT"
    )]
    pub origin_connect_timeout: u64,

    /// Seconds allowed for a complete HTTP origin response.
    #[arg(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(),
        env = "PIXEL_ORIGIN_TIMEOUT"
    )]
    pub origin_timeout: u64,

    // =========================================================================
    // Transform Configuration
    // =========================================================================
    /// Path prefix stripped before reading directives (e.g. /images).
    #[arg(long, env = "PIXEL_ROOT_PATH")]
    pub root_path: Option<String>,

    /// JSON file mapping directive names to transforms.
    #[arg(long, env = "PIXEL_TRANSFORMS")]
    pub transforms: Option<String>,

    /// Convert JPEG/PNG responses to WebP when the client accepts it.
    #[arg(long, default_value_t = false, env = "PIXEL_AUTO_WEBP")]
    pub auto_webp: bool,

    /// Encode every processed image to this format (jpeg, png, webp).
    #[arg(long, value_parser = parse_output_format, env = "PIXEL_OUTPUT_FORMAT")]
    pub output_format: Option<OutputFormat>,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PIXEL_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// PNG compression effort (fast, default, best).
    #[arg(
        long,
        value_parser = parse_png_compression,
        default_value = "default",
        env = "PIXEL_PNG_COMPRESSION"
    )]
    pub png_compression: PngCompression,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Origin cache TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_ORIGIN_TTL.as_secs(), env = "PIXEL_ORIGIN_TTL")]
    pub origin_ttl: u64,

    /// Output cache TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_OUTPUT_TTL.as_secs(), env = "PIXEL_OUTPUT_TTL")]
    pub output_ttl: u64,

    /// Maximum cache size in bytes, shared by originals and outputs.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "PIXEL_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PIXEL_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.origin_url, &self.s3_bucket) {
            (None, None) => {
                return Err(
                    "An origin is required. Set --origin-url (PIXEL_ORIGIN_URL) \
                     or --s3-bucket (PIXEL_S3_BUCKET)"
                        .to_string(),
                )
            }
            (Some(_), Some(_)) => {
                return Err("Set only one of --origin-url and --s3-bucket".to_string())
            }
            (Some(url), None) if url.trim().is_empty() => {
                return Err("origin_url must not be empty".to_string())
            }
            (None, Some(bucket)) if bucket.trim().is_empty() => {
                return Err("s3_bucket must not be empty".to_string())
            }
            _ => {}
        }

        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err(format!(
                "jpeg_quality must be between {MIN_JPEG_QUALITY} and {MAX_JPEG_QUALITY}"
            ));
        }

        if self.origin_connect_timeout == 0 || self.origin_timeout == 0 {
            return Err("origin timeouts must be greater than 0".to_string());
        }

        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Output encoding options from the format flags.
    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            format: self.output_format,
            jpeg: JpegOptions {
                quality: self.jpeg_quality,
            },
            png: PngOptions {
                compression: self.png_compression,
            },
        }
    }

    /// Build the service options, loading the transformation table if one
    /// is configured.
    ///
    /// The origin itself is left unset for S3; the caller injects the
    /// fetcher.
    pub fn service_options(&self) -> Result<ServiceOptions, ConfigError> {
        let transformations = match &self.transforms {
            Some(path) => load_transformations(path)?,
            None => HashMap::new(),
        };

        Ok(ServiceOptions {
            root_path: self.root_path.clone(),
            transformations,
            auto_webp: self.auto_webp,
            output: self.output_options(),
            origin_url: self.origin_url.clone(),
            origin_connect_timeout_secs: self.origin_connect_timeout,
            origin_timeout_secs: self.origin_timeout,
            origin_ttl_secs: self.origin_ttl,
            output_ttl_secs: self.output_ttl,
            cache_capacity: self.cache_capacity,
        })
    }
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_name(value)
        .ok_or_else(|| format!("unknown output format {value:?} (expected jpeg, png or webp)"))
}

fn parse_png_compression(value: &str) -> Result<PngCompression, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "fast" => Ok(PngCompression::Fast),
        "default" => Ok(PngCompression::Default),
        "best" => Ok(PngCompression::Best),
        _ => Err(format!(
            "unknown PNG compression {value:?} (expected fast, default or best)"
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
