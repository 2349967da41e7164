//! Directive parsing.
//!
//! A request path has the shape `<root?>/<directives?>/<remainder>`. The
//! directive segment is a comma-separated list of registry names:
//!
//! ```text
//! /resize,crop/cat.jpg   ──►  forward: /cat.jpg         transforms: [resize, crop]
//! /unknown/cat.jpg       ──►  forward: /unknown/cat.jpg transforms: []
//! /cat.jpg               ──►  forward: /cat.jpg         transforms: []
//! ```
//!
//! Unknown names are dropped without error. When no name resolves, the
//! segment is treated as part of the origin path and left in place.

use url::Url;

use crate::transform::{TransformEntry, TransformRegistry};

/// Result of splitting a request URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// URL to forward to the origin (query string preserved)
    pub forward_url: Url,

    /// Resolved transforms, in directive order
    pub transforms: Vec<TransformEntry>,
}

/// Strategy for extracting the forward URL and transforms from a request.
///
/// The default is [`PathDirectiveParser`]; deployments with a different URL
/// scheme plug in their own implementation.
pub trait DirectiveParser: Send + Sync {
    fn parse(&self, url: &Url, registry: &TransformRegistry) -> ParsedRequest;
}

/// Parses directives from the first path segment after an optional root prefix.
#[derive(Debug, Clone, Default)]
pub struct PathDirectiveParser {
    root: Option<String>,
}

impl PathDirectiveParser {
    /// Create a parser without a root prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser that strips `root` (e.g. `/images`) before reading
    /// directives.
    pub fn with_root(root: impl Into<String>) -> Self {
        let root = normalize_root(&root.into());
        Self { root }
    }

    /// The configured root prefix, normalized to `/prefix` form.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    fn strip_root<'a>(&self, path: &'a str) -> &'a str {
        let Some(root) = self.root.as_deref() else {
            return path;
        };
        match path.strip_prefix(root) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }
}

impl DirectiveParser for PathDirectiveParser {
    fn parse(&self, url: &Url, registry: &TransformRegistry) -> ParsedRequest {
        let path = self.strip_root(url.path());
        let (forward_path, transforms) = split_directives(path, registry);

        let mut forward_url = url.clone();
        forward_url.set_path(forward_path);

        ParsedRequest {
            forward_url,
            transforms,
        }
    }
}

/// Split `path` into the forward path and resolved transforms.
fn split_directives<'a>(
    path: &'a str,
    registry: &TransformRegistry,
) -> (&'a str, Vec<TransformEntry>) {
    let rest = path.strip_prefix('/').unwrap_or(path);

    // No further separator: the whole path is the object name
    let Some(idx) = rest.find('/') else {
        return (path, Vec::new());
    };

    let segment = &rest[..idx];
    let transforms: Vec<TransformEntry> = segment
        .split(',')
        .filter_map(|token| {
            let token = urlencoding::decode(token).ok()?;
            let token = token.trim();
            if token.is_empty() {
                return None;
            }
            registry.get(token).cloned()
        })
        .collect();

    if transforms.is_empty() {
        (path, transforms)
    } else {
        // Keep the leading '/' of the remainder
        (&rest[idx..], transforms)
    }
}

fn normalize_root(root: &str) -> Option<String> {
    let trimmed = root.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
