//! Content negotiation for automatic WebP conversion.

use url::Url;

/// Media type clients advertise to receive WebP.
pub const WEBP_MEDIA_TYPE: &str = "image/webp";

/// Source extensions eligible for automatic conversion.
///
/// Animated and vector formats (gif, svg) are deliberately absent.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Decides whether a response should be converted to WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNegotiator {
    enabled: bool,
}

impl ContentNegotiator {
    /// Create a negotiator; `enabled` is the global auto-conversion flag.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether automatic conversion is globally enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True iff conversion is enabled, the client accepts WebP and the
    /// source extension is on the allow-list.
    pub fn allows(&self, forward_url: &Url, accept: Option<&str>) -> bool {
        self.enabled
            && accept.is_some_and(accepts_webp)
            && has_convertible_extension(forward_url)
    }

    /// Whether the response for `forward_url` depends on the `Accept` header,
    /// whichever variant this particular request gets.
    pub fn varies_on_accept(&self, forward_url: &Url) -> bool {
        self.enabled && has_convertible_extension(forward_url)
    }
}

/// Check an Accept header for `image/webp` with a non-zero quality.
fn accepts_webp(accept: &str) -> bool {
    accept.split(',').any(|range| {
        let mut parts = range.split(';');
        let media_type = parts.next().unwrap_or("").trim();
        if !media_type.eq_ignore_ascii_case(WEBP_MEDIA_TYPE) {
            return false;
        }
        // "image/webp;q=0" explicitly refuses the type
        !parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        })
    })
}

fn has_convertible_extension(url: &Url) -> bool {
    let file = url.path().rsplit('/').next().unwrap_or("");
    let Some((_, ext)) = file.rsplit_once('.') else {
        return false;
    };
    CONVERTIBLE_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
}
