//! Image codec.
//!
//! Thin layer over the `image` crate: container sniffing, decoding into an
//! [`ImageHandle`], the two geometric primitives the pipeline needs, and
//! re-encoding with per-format options.
//!
//! # Design Decisions
//!
//! - **Sniff before decode**: bytes that are not a recognizable JPEG, PNG or
//!   WebP container are reported as `None` by [`ImageCodec::sniff`] so the
//!   caller can pass the origin response through instead of failing.
//!
//! - **Lossless WebP**: the `image` crate only ships a lossless WebP encoder,
//!   so WebP output has no quality knob.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::transform::ResizeKernel;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Formats and Options
// =============================================================================

/// Formats the pipeline can decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// MIME type for the `content-type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Map a media type (`image/jpeg`, ...) to a format.
    pub fn from_content_type(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    /// Parse a format name as used in configuration (`jpeg`, `jpg`, `png`, `webp`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Webp => ImageFormat::WebP,
        }
    }
}

/// JPEG encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JpegOptions {
    /// Quality 1-100; out-of-range values are clamped
    pub quality: u8,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// PNG encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PngOptions {
    pub compression: PngCompression,
}

/// Output encoding configuration.
///
/// `format` is the named output-format instruction: when set, every
/// processed image is encoded to it. Automatic WebP conversion takes
/// precedence over it. The per-format bags apply whenever that format is
/// encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub format: Option<OutputFormat>,
    pub jpeg: JpegOptions,
    pub png: PngOptions,
}

// =============================================================================
// Image Handle
// =============================================================================

/// A decoded image owned by one pipeline execution.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    format: OutputFormat,
}

impl ImageHandle {
    pub fn new(image: DynamicImage, format: OutputFormat) -> Self {
        Self { image, format }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Container format the image was decoded from.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Resample to exactly `width x height`.
    pub fn resize(self, width: u32, height: u32, kernel: ResizeKernel) -> Self {
        let image = self.image.resize_exact(width, height, filter_type(kernel));
        Self { image, ..self }
    }

    /// Keep the `width x height` region at `(x, y)`.
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let image = self.image.crop_imm(x, y, width, height);
        Self { image, ..self }
    }
}

fn filter_type(kernel: ResizeKernel) -> FilterType {
    match kernel {
        ResizeKernel::Nearest => FilterType::Nearest,
        ResizeKernel::Linear => FilterType::Triangle,
        ResizeKernel::Cubic => FilterType::CatmullRom,
        ResizeKernel::Gaussian => FilterType::Gaussian,
        ResizeKernel::Lanczos3 => FilterType::Lanczos3,
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Stateless decoder/encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    /// Identify a supported container from magic bytes.
    pub fn sniff(&self, bytes: &[u8]) -> Option<OutputFormat> {
        image::guess_format(bytes)
            .ok()
            .and_then(OutputFormat::from_image_format)
    }

    /// Decode bytes of a known container format.
    pub fn decode(&self, bytes: &[u8], format: OutputFormat) -> Result<ImageHandle, CodecError> {
        let reader = ImageReader::with_format(Cursor::new(bytes), format.image_format());
        let image = reader.decode().map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })?;
        Ok(ImageHandle::new(image, format))
    }

    /// Encode to `format` using the matching option bag.
    pub fn encode(
        &self,
        handle: &ImageHandle,
        format: OutputFormat,
        options: &OutputOptions,
    ) -> Result<Bytes, CodecError> {
        let mut output = Vec::new();
        let image = handle.image();

        let result = match format {
            OutputFormat::Jpeg => {
                let quality = options.jpeg.quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
                let encoder = JpegEncoder::new_with_quality(&mut output, quality);
                // JPEG has no alpha channel and no 16-bit support
                match image.color() {
                    ColorType::L8 | ColorType::Rgb8 => image.write_with_encoder(encoder),
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
                }
            }
            OutputFormat::Png => {
                let compression = match options.png.compression {
                    PngCompression::Fast => CompressionType::Fast,
                    PngCompression::Default => CompressionType::Default,
                    PngCompression::Best => CompressionType::Best,
                };
                let encoder =
                    PngEncoder::new_with_quality(&mut output, compression, PngFilterType::Adaptive);
                image.write_with_encoder(encoder)
            }
            OutputFormat::Webp => {
                let encoder = WebPEncoder::new_lossless(&mut output);
                // The WebP encoder only takes 8-bit buffers
                match image.color() {
                    ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {
                        image.write_with_encoder(encoder)
                    }
                    color if color.has_alpha() => {
                        DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)
                    }
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
                }
            }
        };

        result.map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Tests
// =============================================================================
