pub mod actions;
pub mod bigmodel;
pub mod gemini;
pub mod prompts;
pub mod remote;
pub mod transport;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::error::ErrorKind;
use crate::pipeline::{ImagePayload, PipelineError};

pub use bigmodel::{BigModelAdapter, BigModelSettings};
pub use gemini::{GeminiAdapter, GeminiSettings};
pub use remote::RemoteProxyAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[default]
    BigModel,
}

impl ProviderKind {
    pub const ALL: [Self; 2] = [Self::Gemini, Self::BigModel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::BigModel => "bigmodel",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::BigModel => "BigModel",
        }
    }

    /// User-facing message shown when an operation on this provider fails.
    pub fn failure_message(self) -> String {
        format!("{} Processing Failed.", self.display_name())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "bigmodel" => Ok(Self::BigModel),
            _ => Err(ProviderError::Unsupported(String::from("Invalid service"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOperation {
    RemoveBackground,
    IdPhoto { color: String },
    Upscale,
    RestorePhoto,
    RemoveObject { description: String },
    TextToImage { prompt: String, size: Option<String> },
    Meme { top_text: String, bottom_text: String },
}

impl ProviderOperation {
    pub fn action(&self) -> &'static str {
        match self {
            Self::RemoveBackground => "removeBackground",
            Self::IdPhoto { .. } => "idPhoto",
            Self::Upscale => "upscale",
            Self::RestorePhoto => "restorePhoto",
            Self::RemoveObject { .. } => "removeObject",
            Self::TextToImage { .. } => "textToImage",
            Self::Meme { .. } => "createMeme",
        }
    }

    pub fn needs_source(&self) -> bool {
        !matches!(self, Self::TextToImage { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Response(String),
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Network(_) => ErrorKind::Infra,
            Self::Response(_) => ErrorKind::Provider,
            Self::InvalidPayload(_) | Self::Unsupported(_) => ErrorKind::Validation,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "provider_not_configured",
            Self::Response(_) => "provider_error",
            Self::Network(_) => "provider_unreachable",
            Self::InvalidPayload(_) => "invalid_params",
            Self::Unsupported(_) => "unsupported_action",
        }
    }

    /// Caller mistakes, as opposed to failures while talking to the provider.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl ProviderError {
    /// An image the provider sent back that could not be decoded.
    pub fn invalid_image(value: PipelineError) -> Self {
        Self::Response(format!("Invalid image response: {value}"))
    }
}

/// A generated image plus what the provider said about the source, if it was asked.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub payload: ImagePayload,
    pub description: Option<String>,
}

impl ProviderOutput {
    pub fn image(payload: ImagePayload) -> Self {
        Self {
            payload,
            description: None,
        }
    }

    /// True when a describe step ran and came back empty.
    pub fn description_was_empty(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|text| text.trim().is_empty())
    }
}

/// Uniform image-operation surface implemented by every provider backend.
pub trait ProviderAdapter: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    fn run(
        &self,
        operation: &ProviderOperation,
        source: Option<&ImagePayload>,
    ) -> Result<ProviderOutput, ProviderError>;

    fn remove_background(&self, image: &ImagePayload) -> Result<ImagePayload, ProviderError> {
        self.run(&ProviderOperation::RemoveBackground, Some(image))
            .map(|out| out.payload)
    }

    fn id_photo(&self, image: &ImagePayload, color: &str) -> Result<ImagePayload, ProviderError> {
        let operation = ProviderOperation::IdPhoto {
            color: color.to_string(),
        };
        self.run(&operation, Some(image)).map(|out| out.payload)
    }

    fn upscale(&self, image: &ImagePayload) -> Result<ImagePayload, ProviderError> {
        self.run(&ProviderOperation::Upscale, Some(image))
            .map(|out| out.payload)
    }

    fn restore_photo(&self, image: &ImagePayload) -> Result<ImagePayload, ProviderError> {
        self.run(&ProviderOperation::RestorePhoto, Some(image))
            .map(|out| out.payload)
    }

    fn remove_object(
        &self,
        image: &ImagePayload,
        description: &str,
    ) -> Result<ImagePayload, ProviderError> {
        let operation = ProviderOperation::RemoveObject {
            description: description.to_string(),
        };
        self.run(&operation, Some(image)).map(|out| out.payload)
    }

    fn text_to_image(
        &self,
        prompt: &str,
        size: Option<&str>,
    ) -> Result<ImagePayload, ProviderError> {
        let operation = ProviderOperation::TextToImage {
            prompt: prompt.to_string(),
            size: size.map(str::to_string),
        };
        self.run(&operation, None).map(|out| out.payload)
    }

    fn create_meme(
        &self,
        image: &ImagePayload,
        top_text: &str,
        bottom_text: &str,
    ) -> Result<ImagePayload, ProviderError> {
        let operation = ProviderOperation::Meme {
            top_text: top_text.to_string(),
            bottom_text: bottom_text.to_string(),
        };
        self.run(&operation, Some(image)).map(|out| out.payload)
    }
}

pub type SharedProviderAdapter = Arc<dyn ProviderAdapter>;

/// One adapter per provider, selected per dispatch.
#[derive(Clone)]
pub struct ProviderRegistry {
    gemini: SharedProviderAdapter,
    bigmodel: SharedProviderAdapter,
}

impl ProviderRegistry {
    pub fn new(gemini: SharedProviderAdapter, bigmodel: SharedProviderAdapter) -> Self {
        Self { gemini, bigmodel }
    }

    pub fn get(&self, kind: ProviderKind) -> SharedProviderAdapter {
        match kind {
            ProviderKind::Gemini => self.gemini.clone(),
            ProviderKind::BigModel => self.bigmodel.clone(),
        }
    }
}

pub(crate) fn require_source<'a>(
    operation: &ProviderOperation,
    source: Option<&'a ImagePayload>,
) -> Result<&'a ImagePayload, ProviderError> {
    source.ok_or_else(|| {
        ProviderError::InvalidPayload(format!(
            "{} requires a source image",
            operation.action()
        ))
    })
}

pub(crate) fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let mut out = text.chars().take(max_chars).collect::<String>();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ImageMime;

    #[test]
    fn provider_kind_parses_service_names() {
        assert_eq!("gemini".parse::<ProviderKind>().ok(), Some(ProviderKind::Gemini));
        assert_eq!(" BigModel ".parse::<ProviderKind>().ok(), Some(ProviderKind::BigModel));
        let err = "openai".parse::<ProviderKind>().expect_err("unknown service");
        assert_eq!(err.to_string(), "Invalid service");
        assert_eq!(ProviderKind::default(), ProviderKind::BigModel);
    }

    #[test]
    fn provider_errors_split_into_client_and_server_faults() {
        let missing_key = ProviderError::Configuration(String::from("GEMINI_API_KEY not configured"));
        assert_eq!(missing_key.kind(), ErrorKind::Infra);
        assert_eq!(missing_key.code(), "provider_not_configured");
        assert!(!missing_key.is_client_error());

        let unknown = ProviderError::Unsupported(String::from("Unknown Gemini action: x"));
        assert_eq!(unknown.kind(), ErrorKind::Validation);
        assert!(unknown.is_client_error());
        assert_eq!(ProviderError::Response(String::new()).kind(), ErrorKind::Provider);
    }

    #[test]
    fn undecodable_provider_image_is_a_provider_fault() {
        let decode = ImagePayload::from_base64(ImageMime::Png, "!!!not base64!!!")
            .expect_err("not base64");
        let err = ProviderError::invalid_image(decode);
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.code(), "provider_error");
        assert!(!err.is_client_error());
        assert!(err.to_string().starts_with("Invalid image response"));
    }

    #[test]
    fn failure_messages_name_the_provider() {
        assert_eq!(
            ProviderKind::Gemini.failure_message(),
            "Gemini Processing Failed."
        );
        assert_eq!(
            ProviderKind::BigModel.failure_message(),
            "BigModel Processing Failed."
        );
    }

    #[test]
    fn only_text_to_image_runs_without_source() {
        let prompt = ProviderOperation::TextToImage {
            prompt: String::from("cat"),
            size: None,
        };
        assert!(!prompt.needs_source());
        assert!(ProviderOperation::Upscale.needs_source());
        assert_eq!(prompt.action(), "textToImage");
    }

    #[test]
    fn empty_description_is_flagged() {
        let payload = ImagePayload::new(crate::pipeline::ImageMime::Png, vec![1]);
        let mut out = ProviderOutput::image(payload);
        assert!(!out.description_was_empty());
        out.description = Some(String::from("  "));
        assert!(out.description_was_empty());
    }

    #[test]
    fn log_truncation_counts_characters() {
        assert_eq!(truncate_for_log("专业证件照", 2), "专业…");
        assert_eq!(truncate_for_log("short", 10), "short");
    }
}
