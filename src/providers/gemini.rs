use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::pipeline::{ImageMime, ImagePayload};
use crate::providers::prompts::prompt_plan;
use crate::providers::transport::{JsonRequest, RequestAuth, SharedHttpTransport};
use crate::providers::{
    truncate_for_log, ProviderAdapter, ProviderError, ProviderKind, ProviderOperation,
    ProviderOutput,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: String::from(DEFAULT_BASE_URL),
            model: String::from(DEFAULT_MODEL),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

/// Single-call adapter: one `generateContent` request carrying the source image and
/// an instruction, answered with an inline image part.
pub struct GeminiAdapter {
    settings: GeminiSettings,
    transport: SharedHttpTransport,
}

impl GeminiAdapter {
    pub fn new(settings: GeminiSettings, transport: SharedHttpTransport) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Configuration(String::from("GEMINI_API_KEY not configured")))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    fn build_body(instruction: &str, aspect_ratio: &str, source: Option<&ImagePayload>) -> Value {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = source {
            parts.push(json!({
                "inlineData": {
                    "data": image.to_base64(),
                    "mimeType": image.mime().as_str(),
                }
            }));
        }
        parts.push(json!({ "text": instruction }));
        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": aspect_ratio }
            }
        })
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn run(
        &self,
        operation: &ProviderOperation,
        source: Option<&ImagePayload>,
    ) -> Result<ProviderOutput, ProviderError> {
        let api_key = self.api_key()?;
        let source = if operation.needs_source() {
            Some(crate::providers::require_source(operation, source)?)
        } else {
            None
        };
        let plan = prompt_plan(operation);

        info!(
            provider = "gemini",
            action = operation.action(),
            model = %self.settings.model,
            aspect_ratio = plan.aspect_ratio,
            "sending generateContent request"
        );
        debug!(instruction = %truncate_for_log(plan.instruction.as_str(), 120), "gemini instruction");

        let reply = self.transport.post_json(&JsonRequest {
            url: self.endpoint(),
            auth: RequestAuth::Header {
                name: "x-goog-api-key",
                value: api_key.to_string(),
            },
            body: Self::build_body(plan.instruction.as_str(), plan.aspect_ratio, source),
        })?;
        if !reply.is_success() {
            return Err(ProviderError::Response(format!(
                "Gemini API Error: HTTP {}: {}",
                reply.status,
                reply.text()
            )));
        }

        let decoded: GenerateContentResponse = reply.decode_json("Gemini")?;
        let inline = decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().find_map(|part| part.inline_data))
            .ok_or_else(|| ProviderError::Response(String::from("No image generated")))?;

        let mime = inline
            .mime_type
            .as_deref()
            .and_then(|raw| raw.parse::<ImageMime>().ok())
            .unwrap_or(ImageMime::Png);
        let payload = ImagePayload::from_base64(mime, inline.data.as_str())
            .map_err(ProviderError::invalid_image)?;
        info!(
            provider = "gemini",
            action = operation.action(),
            bytes = payload.len(),
            "gemini image received"
        );
        Ok(ProviderOutput::image(payload))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::providers::transport::fake::FakeTransport;
    use crate::providers::transport::HttpReply;

    fn configured() -> GeminiSettings {
        GeminiSettings {
            api_key: Some(String::from("test-key")),
            ..GeminiSettings::default()
        }
    }

    fn source() -> ImagePayload {
        ImagePayload::new(ImageMime::Jpeg, vec![0xff, 0xd8, 0xff])
    }

    fn image_reply(data: &str) -> HttpReply {
        HttpReply::json(
            200,
            &json!({
                "candidates": [{
                    "content": { "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": data } }
                    ]}
                }]
            }),
        )
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let transport = FakeTransport::default();
        let adapter = GeminiAdapter::new(GeminiSettings::default(), Arc::new(transport.clone()));

        let err = adapter.upscale(&source()).expect_err("key is missing");
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert_eq!(err.to_string(), "GEMINI_API_KEY not configured");
        assert!(transport.take_seen().is_empty());
    }

    #[test]
    fn id_photo_sends_image_instruction_and_portrait_aspect() {
        let transport = FakeTransport::with_replies([Ok(image_reply("AQID"))]);
        let adapter = GeminiAdapter::new(configured(), Arc::new(transport.clone()));

        let out = adapter.id_photo(&source(), "white").expect("id photo");
        assert_eq!(out.mime(), ImageMime::Png);
        assert_eq!(out.bytes(), &[1, 2, 3]);

        let seen = transport.take_seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            seen[0].auth,
            RequestAuth::Header {
                name: "x-goog-api-key",
                value: String::from("test-key")
            }
        );
        let parts = &seen[0].body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("/9j/"));
        assert_eq!(
            parts[1]["text"],
            json!("Remove background and replace with solid white. Perform light professional face retouching and center the subject for an ID photo.")
        );
        assert_eq!(
            seen[0].body["generationConfig"]["imageConfig"]["aspectRatio"],
            json!("3:4")
        );
    }

    #[test]
    fn text_to_image_sends_text_part_only() {
        let transport = FakeTransport::with_replies([Ok(image_reply("AQID"))]);
        let adapter = GeminiAdapter::new(configured(), Arc::new(transport.clone()));

        adapter
            .text_to_image("a lighthouse at dusk", None)
            .expect("text to image");
        let seen = transport.take_seen();
        let parts = seen[0].body["contents"][0]["parts"]
            .as_array()
            .expect("parts array");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], json!("a lighthouse at dusk"));
    }

    #[test]
    fn reply_without_image_part_is_an_error() {
        let transport = FakeTransport::with_replies([Ok(HttpReply::json(
            200,
            &json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]}),
        ))]);
        let adapter = GeminiAdapter::new(configured(), Arc::new(transport));

        let err = adapter.restore_photo(&source()).expect_err("no image part");
        assert!(matches!(err, ProviderError::Response(_)));
        assert_eq!(err.to_string(), "No image generated");
    }

    #[test]
    fn http_error_surfaces_provider_text() {
        let transport = FakeTransport::with_replies([Ok(HttpReply::json(
            403,
            &json!({"error": {"message": "API key not valid"}}),
        ))]);
        let adapter = GeminiAdapter::new(configured(), Arc::new(transport));

        let err = adapter.remove_background(&source()).expect_err("forbidden");
        assert!(err.to_string().contains("HTTP 403"));
        assert!(err.to_string().contains("API key not valid"));
    }
}
