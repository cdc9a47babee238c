use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::pipeline::payload::{ImageMime, ImagePayload};
use crate::pipeline::PipelineError;

/// Draws the source onto an exact `width` x `height` PNG canvas. No aspect correction.
pub fn resize(
    source: &ImagePayload,
    width: u32,
    height: u32,
) -> Result<ImagePayload, PipelineError> {
    ensure_dimensions(width, height)?;
    let image = source.decode()?;
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    ImagePayload::encode_from(&resized, ImageMime::Png)
}

/// Re-encodes into `target` at `quality` (0.0 to 1.0, clamped).
///
/// Targets without an alpha channel are composited over opaque white first. Only
/// JPEG honours `quality`; the remaining encoders are lossless in the image crate.
pub fn convert(
    source: &ImagePayload,
    target: ImageMime,
    quality: f32,
) -> Result<ImagePayload, PipelineError> {
    let image = source.decode()?;
    encode_with_quality(&image, target, quality)
}

pub(crate) fn encode_with_quality(
    image: &DynamicImage,
    target: ImageMime,
    quality: f32,
) -> Result<ImagePayload, PipelineError> {
    match target {
        ImageMime::Jpeg => {
            let flattened = flatten_on_white(image);
            let mut buf = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality));
            encoder.encode_image(&flattened)?;
            Ok(ImagePayload::new(ImageMime::Jpeg, buf))
        }
        ImageMime::Bmp => {
            let flattened = DynamicImage::ImageRgb8(flatten_on_white(image));
            ImagePayload::encode_from(&flattened, ImageMime::Bmp)
        }
        ImageMime::Webp | ImageMime::Png | ImageMime::Tiff => {
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            ImagePayload::encode_from(&rgba, target)
        }
    }
}

/// Maps a 0.0..=1.0 quality fraction to the encoder's 1..=100 scale.
pub(crate) fn jpeg_quality(quality: f32) -> u8 {
    let clamped = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        1.0
    };
    ((clamped * 100.0).round() as u8).clamp(1, 100)
}

pub(crate) fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            let mixed = (u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255;
            mixed as u8
        };
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// How a source is scaled to cover a target canvas, expressed as the window of
/// source pixels that stays visible after centering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverGeometry {
    pub scale: f64,
    pub window_x: u32,
    pub window_y: u32,
    pub window_width: u32,
    pub window_height: u32,
}

pub fn cover_geometry(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<CoverGeometry, PipelineError> {
    ensure_dimensions(source_width, source_height)?;
    ensure_dimensions(target_width, target_height)?;

    let (sw, sh) = (f64::from(source_width), f64::from(source_height));
    let (tw, th) = (f64::from(target_width), f64::from(target_height));
    let scale = (tw / sw).max(th / sh);

    let window_width = ((tw / scale).round() as u32).clamp(1, source_width);
    let window_height = ((th / scale).round() as u32).clamp(1, source_height);

    Ok(CoverGeometry {
        scale,
        window_x: (source_width - window_width) / 2,
        window_y: (source_height - window_height) / 2,
        window_width,
        window_height,
    })
}

/// Scales the source to cover `width` x `height`, centers it and crops the overflow.
///
/// The visible window is cut from the source before resampling, so only
/// `width` x `height` pixels are ever allocated for the output.
pub fn crop_to_id_size(
    source: &ImagePayload,
    width: u32,
    height: u32,
) -> Result<ImagePayload, PipelineError> {
    ensure_dimensions(width, height)?;
    let image = source.decode()?;
    let geometry = cover_geometry(image.width(), image.height(), width, height)?;

    let window = image.crop_imm(
        geometry.window_x,
        geometry.window_y,
        geometry.window_width,
        geometry.window_height,
    );
    let cropped = window.resize_exact(width, height, FilterType::Lanczos3);
    ImagePayload::encode_from(&cropped, ImageMime::Png)
}

fn ensure_dimensions(width: u32, height: u32) -> Result<(), PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidDimensions { width, height });
    }
    Ok(())
}
