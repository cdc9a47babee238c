use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::pipeline::{ImageMime, ImagePayload};
use crate::providers::prompts::{prompt_plan, DEFAULT_GENERATION_SIZE};
use crate::providers::transport::{HttpReply, JsonRequest, RequestAuth, SharedHttpTransport};
use crate::providers::{
    require_source, truncate_for_log, ProviderAdapter, ProviderError, ProviderKind,
    ProviderOperation, ProviderOutput,
};

pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_VISION_MODEL: &str = "glm-4v-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "cogview-3-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigModelSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub image_model: String,
}

impl Default for BigModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: String::from(DEFAULT_BASE_URL),
            vision_model: String::from(DEFAULT_VISION_MODEL),
            image_model: String::from(DEFAULT_IMAGE_MODEL),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_image: Option<String>,
    url: Option<String>,
}

/// Describe-then-generate adapter. The vision model describes the source, and the
/// image model synthesizes a new picture from that description plus a directive.
/// The two calls are strictly sequential.
pub struct BigModelAdapter {
    settings: BigModelSettings,
    transport: SharedHttpTransport,
}

impl BigModelAdapter {
    pub fn new(settings: BigModelSettings, transport: SharedHttpTransport) -> Self {
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
            .ok_or_else(|| {
                ProviderError::Configuration(String::from("BIGMODEL_API_KEY not configured"))
            })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url.trim_end_matches('/'))
    }

    fn post(&self, api_key: &str, path: &str, body: Value) -> Result<HttpReply, ProviderError> {
        let reply = self.transport.post_json(&JsonRequest {
            url: self.url(path),
            auth: RequestAuth::Bearer(api_key.to_string()),
            body,
        })?;
        if !reply.is_success() {
            return Err(ProviderError::Response(format!(
                "BigModel API Error: {}",
                reply.text()
            )));
        }
        Ok(reply)
    }

    /// Returns an empty string when the model answers without content.
    fn describe(
        &self,
        api_key: &str,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.settings.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": image.to_data_uri() } },
                    { "type": "text", "text": prompt }
                ]
            }]
        });
        let reply = self.post(api_key, "/chat/completions", body)?;
        let decoded: ChatCompletionResponse = reply.decode_json("BigModel")?;
        let description = decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .and_then(|content| content.as_str().map(str::to_string))
            .unwrap_or_default();
        Ok(description)
    }

    fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        size: Option<&str>,
    ) -> Result<ImagePayload, ProviderError> {
        let size = size.unwrap_or(DEFAULT_GENERATION_SIZE);
        debug!(
            size,
            prompt = %truncate_for_log(prompt, 120),
            "bigmodel generation prompt"
        );
        let body = json!({
            "model": self.settings.image_model,
            "prompt": prompt,
            "size": size,
        });
        let reply = self.post(api_key, "/images/generations", body)?;
        let decoded: ImageGenerationResponse = reply.decode_json("BigModel")?;
        let first = decoded
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Response(String::from("No image generated")))?;

        if let Some(b64) = first.b64_image.as_deref() {
            return ImagePayload::from_base64(ImageMime::Png, b64)
                .map_err(ProviderError::invalid_image);
        }
        if let Some(image_url) = first.url.as_deref() {
            return self.download(image_url);
        }
        Err(ProviderError::Response(String::from("Invalid image response")))
    }

    fn download(&self, image_url: &str) -> Result<ImagePayload, ProviderError> {
        let parsed = url::Url::parse(image_url).map_err(|e| {
            ProviderError::Response(format!("Invalid image response: bad url '{image_url}': {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::Response(format!(
                "Invalid image response: unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }

        let reply = self.transport.get(parsed.as_str())?;
        if !reply.is_success() {
            return Err(ProviderError::Response(format!(
                "BigModel image download failed: HTTP {}",
                reply.status
            )));
        }
        let declared = reply
            .content_type
            .as_deref()
            .and_then(|raw| raw.split(';').next())
            .and_then(|raw| raw.parse::<ImageMime>().ok());
        let payload = match declared {
            Some(mime) => ImagePayload::new(mime, reply.body),
            None => ImagePayload::sniff(reply.body).map_err(ProviderError::invalid_image)?,
        };
        info!(bytes = payload.len(), mime = %payload.mime(), "bigmodel image downloaded");
        Ok(payload)
    }
}

impl ProviderAdapter for BigModelAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BigModel
    }

    fn run(
        &self,
        operation: &ProviderOperation,
        source: Option<&ImagePayload>,
    ) -> Result<ProviderOutput, ProviderError> {
        let api_key = self.api_key()?;
        let plan = prompt_plan(operation);

        let description = match plan.describe_prompt {
            Some(describe_prompt) => {
                let image = require_source(operation, source)?;
                info!(
                    provider = "bigmodel",
                    action = operation.action(),
                    model = %self.settings.vision_model,
                    "requesting image description"
                );
                let text = self.describe(api_key, describe_prompt, image)?;
                if text.trim().is_empty() {
                    warn!(
                        provider = "bigmodel",
                        action = operation.action(),
                        "vision model returned an empty description; generating anyway"
                    );
                }
                Some(text)
            }
            None => None,
        };

        let prompt = plan.compose_generation_prompt(description.as_deref().unwrap_or_default());
        info!(
            provider = "bigmodel",
            action = operation.action(),
            model = %self.settings.image_model,
            prompt_chars = prompt.chars().count(),
            "requesting image generation"
        );
        let payload = self.generate(api_key, prompt.as_str(), plan.size.as_deref())?;
        Ok(ProviderOutput {
            payload,
            description,
        })
    }
}
