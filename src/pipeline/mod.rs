pub mod compress;
pub mod payload;
pub mod presets;
pub mod transform;

use thiserror::Error;

pub use compress::{compress_to_size, CompressionAttempt, CompressionOutcome};
pub use payload::{ImageMime, ImagePayload};
pub use presets::{find_id_photo_size, find_resize_preset, IdPhotoSize, ResizePreset};
pub use transform::{convert, cover_geometry, crop_to_id_size, resize, CoverGeometry};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),
    #[error("unsupported image type '{0}'")]
    UnsupportedMime(String),
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("image base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
