use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::pipeline::{ImageMime, ImagePayload, PipelineError};

/// Source of crop geometry for the resize tool.
///
/// Implementations return `Ok(None)` when they have nothing to offer, in which case
/// the orchestrator falls back to a plain resize of the whole image.
pub trait CropStrategy: Send + Sync + 'static {
    fn export(
        &self,
        source: &ImagePayload,
        width: u32,
        height: u32,
    ) -> Result<Option<ImagePayload>, PipelineError>;
}

pub type SharedCropStrategy = Arc<dyn CropStrategy>;

/// A crop box in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Holds the region picked in an interactive cropper and exports it at the requested
/// output size, like a cropper's canvas export.
#[derive(Debug, Default)]
pub struct RegionCropStrategy {
    region: Mutex<Option<CropRegion>>,
}

impl RegionCropStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_region(&self, region: CropRegion) {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner) = Some(region);
    }

    pub fn clear(&self) {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn region(&self) -> Option<CropRegion> {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CropStrategy for RegionCropStrategy {
    fn export(
        &self,
        source: &ImagePayload,
        width: u32,
        height: u32,
    ) -> Result<Option<ImagePayload>, PipelineError> {
        let Some(region) = self.region() else {
            return Ok(None);
        };
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }

        let image = source.decode()?;
        let x = region.x.min(image.width());
        let y = region.y.min(image.height());
        let crop_width = region.width.min(image.width() - x);
        let crop_height = region.height.min(image.height() - y);
        if crop_width == 0 || crop_height == 0 {
            return Err(PipelineError::InvalidDimensions {
                width: crop_width,
                height: crop_height,
            });
        }

        let cropped = image
            .crop_imm(x, y, crop_width, crop_height)
            .resize_exact(width, height, FilterType::Lanczos3);
        ImagePayload::encode_from(&cropped, ImageMime::Png).map(Some)
    }
}
