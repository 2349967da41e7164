//! Image pipeline: codec, crop strategies and the sequential executor.

mod codec;
mod executor;
mod smart_crop;

pub use codec::{
    ImageCodec, ImageHandle, JpegOptions, OutputFormat, OutputOptions, PngCompression, PngOptions,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use executor::{apply, crop_size, resize_target, EncodedImage, PipelineExecutor};
pub use smart_crop::crop_origin;
