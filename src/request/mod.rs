//! Request interpretation: directive parsing and content negotiation.
//!
//! ```text
//! GET /resize,crop/cat.jpg   Accept: image/webp
//!        │                          │
//!        ▼                          ▼
//!  DirectiveParser           ContentNegotiator
//!   forward_url, transforms        webp: bool
//!        └──────────┬───────────────┘
//!                   ▼
//!             RequestContext
//! ```

mod negotiate;
mod parser;

pub use negotiate::{ContentNegotiator, CONVERTIBLE_EXTENSIONS, WEBP_MEDIA_TYPE};
pub use parser::{DirectiveParser, ParsedRequest, PathDirectiveParser};

use http::Method;
use url::Url;

use crate::transform::TransformEntry;

/// Per-request state, alive for exactly one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Inbound method (GET or HEAD)
    pub method: Method,

    /// Inbound request URL
    pub url: Url,

    /// URL handed to the origin
    pub forward_url: Url,

    /// Inbound `Accept` header, if any
    pub accept: Option<String>,

    /// Whether the response is converted to WebP
    pub webp: bool,

    /// Resolved transforms, in directive order
    pub transforms: Vec<TransformEntry>,
}
