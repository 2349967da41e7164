use thiserror::Error;

/// Errors from the origin transport.
///
/// An origin that answers with a non-200 status is not an error: that
/// response is relayed as-is. These variants cover the cases where no
/// response could be obtained at all.
#[derive(Debug, Clone, Error)]
pub enum OriginError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The forward URL cannot be mapped onto the origin
    #[error("Invalid origin URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised while decoding or encoding image bytes.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Bytes were recognized as an image container but could not be decoded
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Re-encoding the transformed image failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// The blocking worker running the pipeline panicked or was cancelled
    #[error("Pipeline task failed: {0}")]
    Task(String),
}

/// Errors surfaced by the image service to the HTTP layer.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Decode/encode failure on bytes believed to be an image (HTTP 500)
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The origin could not be reached (HTTP 502)
    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),
}

/// Errors loading the service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The transformation table file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The transformation table is not valid JSON or has invalid entries
    #[error("Invalid transformation table: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
