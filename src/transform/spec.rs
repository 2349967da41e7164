//! Transform definitions.
//!
//! A [`TransformationSpec`] is the configuration-time description of one image
//! operation with its parameters bound. Specs are immutable values: the
//! registry hands out clones and the pipeline executor interprets them.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

// =============================================================================
// Dimension
// =============================================================================

/// A target dimension, either absolute pixels or a percentage of the
/// current image dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    /// Absolute size in pixels
    Pixels(u32),

    /// Percentage of the image dimension at the step it is applied
    Percent(f64),
}

impl Dimension {
    /// Resolve against the current size of the image along this axis.
    ///
    /// Returns `None` when the result is not a usable dimension: zero pixels,
    /// a percentage of an unknown (zero) size, or a non-positive percentage.
    pub fn resolve(&self, current: u32) -> Option<u32> {
        match *self {
            Dimension::Pixels(0) => None,
            Dimension::Pixels(px) => Some(px),
            Dimension::Percent(pct) => {
                if current == 0 || !pct.is_finite() || pct <= 0.0 {
                    return None;
                }
                let resolved = (f64::from(current) * pct / 100.0).round();
                if resolved < 1.0 {
                    None
                } else {
                    Some(resolved.min(f64::from(u32::MAX)) as u32)
                }
            }
        }
    }

    /// Parse a dimension string: `"640"` or `"50%"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: f64 = pct
                .trim()
                .parse()
                .map_err(|_| format!("invalid percentage: {s}"))?;
            if !value.is_finite() {
                return Err(format!("invalid percentage: {s}"));
            }
            Ok(Dimension::Percent(value))
        } else {
            s.parse::<u32>()
                .map(Dimension::Pixels)
                .map_err(|_| format!("invalid dimension: {s}"))
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(px) => write!(f, "{px}"),
            Dimension::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

impl From<u32> for Dimension {
    fn from(px: u32) -> Self {
        Dimension::Pixels(px)
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dimension::Pixels(px) => serializer.serialize_u32(*px),
            Dimension::Percent(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(px) => Ok(Dimension::Pixels(px)),
            Raw::Text(s) => Dimension::parse(&s).map_err(de::Error::custom),
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// How a resize treats the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Fit inside the target box, preserving aspect ratio
    #[default]
    Fit,

    /// Stretch to the exact target box, ignoring aspect ratio
    Scale,

    /// Like `Fit`, but never enlarge past the source size
    Limit,
}

/// Resampling kernel used by a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeKernel {
    Nearest,
    Linear,
    Cubic,
    Gaussian,
    #[default]
    Lanczos3,
}

/// Which region a crop keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gravity {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
    /// Content-aware: keep the highest-entropy region
    Smart,
}

// =============================================================================
// Operation Descriptor
// =============================================================================

/// Serializable `{name, params}` form of a transform instance.
///
/// This is the shape handed to a remote image-processing service and the
/// input of cache key digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub params: Value,
}

// =============================================================================
// Transformation Spec
// =============================================================================

/// A named image operation with bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformationSpec {
    Resize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<Dimension>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<Dimension>,
        #[serde(default)]
        mode: ResizeMode,
        #[serde(default)]
        kernel: ResizeKernel,
    },
    Crop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<Dimension>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<Dimension>,
        #[serde(default)]
        gravity: Gravity,
    },
}

impl TransformationSpec {
    /// Resize to a width, keeping the aspect ratio.
    pub fn resize(width: impl Into<Dimension>) -> Self {
        TransformationSpec::Resize {
            width: Some(width.into()),
            height: None,
            mode: ResizeMode::Fit,
            kernel: ResizeKernel::default(),
        }
    }

    /// Resize into a `width x height` box.
    pub fn resize_to(width: impl Into<Dimension>, height: impl Into<Dimension>) -> Self {
        TransformationSpec::Resize {
            width: Some(width.into()),
            height: Some(height.into()),
            mode: ResizeMode::Fit,
            kernel: ResizeKernel::default(),
        }
    }

    /// Content-aware crop. Without a height the crop is square.
    pub fn smart_crop(width: impl Into<Dimension>, height: Option<Dimension>) -> Self {
        let width = width.into();
        TransformationSpec::Crop {
            width: Some(width),
            height: Some(height.unwrap_or(width)),
            gravity: Gravity::Smart,
        }
    }

    /// Builder-style mode override; no effect on crops.
    pub fn with_mode(mut self, new_mode: ResizeMode) -> Self {
        if let TransformationSpec::Resize { ref mut mode, .. } = self {
            *mode = new_mode;
        }
        self
    }

    /// Short operation name.
    pub fn name(&self) -> &'static str {
        match self {
            TransformationSpec::Resize { .. } => "resize",
            TransformationSpec::Crop { .. } => "crop",
        }
    }

    /// Check that at least one target dimension is configured.
    pub fn validate(&self) -> Result<(), String> {
        let (width, height) = match self {
            TransformationSpec::Resize { width, height, .. }
            | TransformationSpec::Crop { width, height, .. } => (width, height),
        };
        if width.is_none() && height.is_none() {
            return Err(format!(
                "{} needs at least a width or a height",
                self.name()
            ));
        }
        Ok(())
    }

    /// Describe this operation as a `{name, params}` pair.
    pub fn describe(&self) -> OperationDescriptor {
        let params = match self {
            TransformationSpec::Resize {
                width,
                height,
                mode,
                kernel,
            } => json!({
                "width": width,
                "height": height,
                "mode": mode,
                "kernel": kernel,
            }),
            TransformationSpec::Crop {
                width,
                height,
                gravity,
            } => json!({
                "width": width,
                "height": height,
                "gravity": gravity,
            }),
        };

        OperationDescriptor {
            name: self.name().to_string(),
            params,
        }
    }
}

// =============================================================================
// Transform Entry
// =============================================================================

/// What a directive name maps to: one operation or an ordered group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformEntry {
    Group(Vec<TransformationSpec>),
    Single(TransformationSpec),
}

impl TransformEntry {
    /// The operations of this entry, in order.
    pub fn specs(&self) -> &[TransformationSpec] {
        match self {
            TransformEntry::Group(specs) => specs,
            TransformEntry::Single(spec) => std::slice::from_ref(spec),
        }
    }
}

impl From<TransformationSpec> for TransformEntry {
    fn from(spec: TransformationSpec) -> Self {
        TransformEntry::Single(spec)
    }
}

impl From<Vec<TransformationSpec>> for TransformEntry {
    fn from(specs: Vec<TransformationSpec>) -> Self {
        TransformEntry::Group(specs)
    }
}

/// Flatten a list of entries one level, preserving overall order.
pub fn flatten(entries: &[TransformEntry]) -> Vec<&TransformationSpec> {
    entries.iter().flat_map(|entry| entry.specs()).collect()
}

// =============================================================================
// Tests
// =============================================================================
