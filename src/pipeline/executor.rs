//! Transformation pipeline executor.
//!
//! Applies a resolved transform list to origin bytes:
//!
//! ```text
//! bytes ─► sniff ─► decode ─► step 1 ─► step 2 ─► ... ─► encode ─► EncodedImage
//!            │
//!            └─ not an image container ─► None (caller passes origin through)
//! ```
//!
//! Steps run strictly in order; each one sees the previous step's output, so
//! percentage dimensions resolve against the current image, not the source.

use bytes::Bytes;
use tracing::debug;

use crate::error::CodecError;
use crate::transform::{flatten, Dimension, ResizeMode, TransformEntry, TransformationSpec};

use super::codec::{ImageCodec, ImageHandle, OutputFormat, OutputOptions};
use super::smart_crop::crop_origin;

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Runs transform lists against image bytes.
#[derive(Debug, Clone, Default)]
pub struct PipelineExecutor {
    codec: ImageCodec,
    output: OutputOptions,
}

impl PipelineExecutor {
    /// Create an executor with the given output encoding options.
    pub fn new(output: OutputOptions) -> Self {
        Self {
            codec: ImageCodec::new(),
            output,
        }
    }

    pub fn output_options(&self) -> &OutputOptions {
        &self.output
    }

    /// Whether a request needs decoding at all.
    ///
    /// With no transforms, no WebP conversion and no named output format the
    /// origin bytes can be served as they are.
    pub fn needs_processing(&self, transforms: &[TransformEntry], webp: bool) -> bool {
        webp || self.output.format.is_some() || !flatten(transforms).is_empty()
    }

    /// Final encoding format. Automatic WebP conversion overrides the named
    /// output format.
    pub fn target_format(&self, source: OutputFormat, webp: bool) -> OutputFormat {
        if webp {
            OutputFormat::Webp
        } else {
            self.output.format.unwrap_or(source)
        }
    }

    /// Decode, transform and re-encode.
    ///
    /// Returns `Ok(None)` when `bytes` is not a supported image container.
    pub fn execute(
        &self,
        bytes: &[u8],
        transforms: &[TransformEntry],
        webp: bool,
    ) -> Result<Option<EncodedImage>, CodecError> {
        let Some(source_format) = self.codec.sniff(bytes) else {
            debug!("origin bytes are not a supported image container");
            return Ok(None);
        };

        let mut handle = self.codec.decode(bytes, source_format)?;
        debug!(
            width = handle.width(),
            height = handle.height(),
            format = ?source_format,
            "decoded origin image"
        );

        for spec in flatten(transforms) {
            handle = apply(handle, spec);
        }

        let format = self.target_format(source_format, webp);
        let bytes = self.codec.encode(&handle, format, &self.output)?;

        Ok(Some(EncodedImage {
            bytes,
            format,
            width: handle.width(),
            height: handle.height(),
        }))
    }

    /// [`execute`](Self::execute) on the blocking thread pool.
    pub async fn execute_blocking(
        &self,
        bytes: Bytes,
        transforms: Vec<TransformEntry>,
        webp: bool,
    ) -> Result<Option<EncodedImage>, CodecError> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.execute(&bytes, &transforms, webp))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))?
    }
}

/// Apply one step. Degenerate targets leave the image untouched.
pub fn apply(handle: ImageHandle, spec: &TransformationSpec) -> ImageHandle {
    match spec {
        TransformationSpec::Resize {
            width,
            height,
            mode,
            kernel,
        } => match resize_target(handle.width(), handle.height(), *width, *height, *mode) {
            Some((w, h)) if (w, h) != (handle.width(), handle.height()) => {
                debug!(from_w = handle.width(), from_h = handle.height(), w, h, "resize");
                handle.resize(w, h, *kernel)
            }
            _ => handle,
        },
        TransformationSpec::Crop {
            width,
            height,
            gravity,
        } => match crop_size(handle.width(), handle.height(), *width, *height) {
            Some((w, h)) if (w, h) != (handle.width(), handle.height()) => {
                let (x, y) = crop_origin(handle.image(), w, h, *gravity);
                debug!(x, y, w, h, gravity = ?gravity, "crop");
                handle.crop(x, y, w, h)
            }
            _ => handle,
        },
    }
}

/// Output size of a resize, or `None` for a no-op.
pub fn resize_target(
    current_w: u32,
    current_h: u32,
    width: Option<Dimension>,
    height: Option<Dimension>,
    mode: ResizeMode,
) -> Option<(u32, u32)> {
    if current_w == 0 || current_h == 0 {
        return None;
    }

    let w = width.and_then(|d| d.resolve(current_w));
    let h = height.and_then(|d| d.resolve(current_h));

    let (target_w, target_h) = match (w, h) {
        (None, None) => return None,
        (Some(w), None) => (w, scale_dim(current_h, w, current_w)),
        (None, Some(h)) => (scale_dim(current_w, h, current_h), h),
        (Some(w), Some(h)) => match mode {
            ResizeMode::Scale => (w, h),
            ResizeMode::Fit | ResizeMode::Limit => {
                let ratio = (f64::from(w) / f64::from(current_w))
                    .min(f64::from(h) / f64::from(current_h));
                (
                    round_dim(f64::from(current_w) * ratio),
                    round_dim(f64::from(current_h) * ratio),
                )
            }
        },
    };

    if mode == ResizeMode::Limit && (target_w > current_w || target_h > current_h) {
        return None;
    }

    Some((target_w, target_h))
}

/// Window size of a crop, clamped to the image, or `None` for a no-op.
pub fn crop_size(
    current_w: u32,
    current_h: u32,
    width: Option<Dimension>,
    height: Option<Dimension>,
) -> Option<(u32, u32)> {
    if current_w == 0 || current_h == 0 || (width.is_none() && height.is_none()) {
        return None;
    }

    let w = match width {
        Some(d) => d.resolve(current_w)?,
        None => current_w,
    };
    let h = match height {
        Some(d) => d.resolve(current_h)?,
        None => current_h,
    };

    Some((w.min(current_w), h.min(current_h)))
}

/// `other * target / base`, rounded, at least 1.
fn scale_dim(other: u32, target: u32, base: u32) -> u32 {
    round_dim(f64::from(other) * f64::from(target) / f64::from(base))
}

fn round_dim(value: f64) -> u32 {
    value.round().clamp(1.0, f64::from(u32::MAX)) as u32
}
