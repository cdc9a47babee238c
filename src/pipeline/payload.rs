use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Accepts file extensions as well as mime strings, for CLI use.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn has_alpha_channel(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp)
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageMime {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/webp" => Ok(Self::Webp),
            "image/bmp" => Ok(Self::Bmp),
            "image/tiff" => Ok(Self::Tiff),
            other => Self::from_extension(other)
                .ok_or_else(|| PipelineError::UnsupportedMime(raw.trim().to_string())),
        }
    }
}

impl Serialize for ImageMime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImageMime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Encoded image bytes tagged with their mime type.
///
/// Every pipeline stage, provider adapter and the proxy consume and produce this
/// value. On the wire it is a `data:<mime>;base64,<payload>` string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePayload {
    mime: ImageMime,
    bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime: ImageMime, bytes: Vec<u8>) -> Self {
        Self { mime, bytes }
    }

    /// Builds a payload from raw bytes, tagging it with the sniffed format.
    pub fn sniff(bytes: Vec<u8>) -> Result<Self, PipelineError> {
        let format = image::guess_format(bytes.as_slice())?;
        let mime = ImageMime::from_image_format(format)
            .ok_or_else(|| PipelineError::UnsupportedMime(format!("{format:?}")))?;
        Ok(Self { mime, bytes })
    }

    pub fn from_base64(mime: ImageMime, encoded: &str) -> Result<Self, PipelineError> {
        let bytes = BASE64_STANDARD.decode(encoded.trim().as_bytes())?;
        Ok(Self { mime, bytes })
    }

    pub fn from_data_uri(raw: &str) -> Result<Self, PipelineError> {
        let rest = raw.trim().strip_prefix("data:").ok_or_else(|| {
            PipelineError::InvalidDataUri(String::from("missing 'data:' prefix"))
        })?;
        let (mime_raw, encoded) = rest.split_once(";base64,").ok_or_else(|| {
            PipelineError::InvalidDataUri(String::from("missing ';base64,' marker"))
        })?;
        let mime = mime_raw.parse::<ImageMime>()?;
        Self::from_base64(mime, encoded)
    }

    pub fn encode_from(image: &DynamicImage, mime: ImageMime) -> Result<Self, PipelineError> {
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        if mime.has_alpha_channel() {
            image.write_to(&mut cursor, mime.image_format())?;
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut cursor, mime.image_format())?;
        }
        Ok(Self { mime, bytes: buf })
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.bytes.as_slice())
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime.as_str(), self.to_base64())
    }

    pub fn decode(&self) -> Result<DynamicImage, PipelineError> {
        Ok(image::load_from_memory(self.bytes.as_slice())?)
    }

    pub fn dimensions(&self) -> Result<(u32, u32), PipelineError> {
        let image = self.decode()?;
        Ok((image.width(), image.height()))
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl TryFrom<String> for ImagePayload {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_data_uri(value.as_str())
    }
}

impl From<ImagePayload> for String {
    fn from(value: ImagePayload) -> Self {
        value.to_data_uri()
    }
}
