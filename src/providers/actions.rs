use serde_json::{json, Map, Value};

use crate::pipeline::ImagePayload;
use crate::providers::{ProviderError, ProviderKind, ProviderOperation};

pub const DEFAULT_ID_COLOR: &str = "white";

/// A proxy `{action, params}` pair resolved into an operation and its source image.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub operation: ProviderOperation,
    pub source: Option<ImagePayload>,
}

pub fn parse_action(
    provider: ProviderKind,
    action: &str,
    params: &Value,
) -> Result<ActionRequest, ProviderError> {
    let operation = match action.trim() {
        "removeBackground" => ProviderOperation::RemoveBackground,
        "idPhoto" => ProviderOperation::IdPhoto {
            color: optional_string(params, "color")?
                .unwrap_or_else(|| String::from(DEFAULT_ID_COLOR)),
        },
        "upscale" => ProviderOperation::Upscale,
        "restorePhoto" => ProviderOperation::RestorePhoto,
        "removeObject" => ProviderOperation::RemoveObject {
            description: optional_string(params, "description")?.unwrap_or_default(),
        },
        "textToImage" => ProviderOperation::TextToImage {
            prompt: optional_string(params, "prompt")?
                .filter(|prompt| !prompt.trim().is_empty())
                .ok_or_else(|| missing_param("prompt"))?,
            size: optional_string(params, "size")?.filter(|size| !size.trim().is_empty()),
        },
        "createMeme" => ProviderOperation::Meme {
            top_text: optional_string(params, "topText")?.unwrap_or_default(),
            bottom_text: optional_string(params, "bottomText")?.unwrap_or_default(),
        },
        other => {
            return Err(ProviderError::Unsupported(format!(
                "Unknown {} action: {other}",
                provider.display_name()
            )));
        }
    };

    let source = if operation.needs_source() {
        let raw = optional_string(params, "image")?.ok_or_else(|| missing_param("image"))?;
        let payload = ImagePayload::from_data_uri(raw.as_str()).map_err(|e| {
            ProviderError::InvalidPayload(format!("Invalid 'image' parameter: {e}"))
        })?;
        Some(payload)
    } else {
        None
    };

    Ok(ActionRequest { operation, source })
}

/// Inverse of [`parse_action`], used by clients of the proxy.
pub fn action_params(operation: &ProviderOperation, source: Option<&ImagePayload>) -> Value {
    let mut params = Map::new();
    if let Some(image) = source {
        params.insert(String::from("image"), json!(image.to_data_uri()));
    }
    match operation {
        ProviderOperation::IdPhoto { color } => {
            params.insert(String::from("color"), json!(color));
        }
        ProviderOperation::RemoveObject { description } => {
            params.insert(String::from("description"), json!(description));
        }
        ProviderOperation::TextToImage { prompt, size } => {
            params.insert(String::from("prompt"), json!(prompt));
            if let Some(size) = size {
                params.insert(String::from("size"), json!(size));
            }
        }
        ProviderOperation::Meme {
            top_text,
            bottom_text,
        } => {
            params.insert(String::from("topText"), json!(top_text));
            params.insert(String::from("bottomText"), json!(bottom_text));
        }
        ProviderOperation::RemoveBackground
        | ProviderOperation::Upscale
        | ProviderOperation::RestorePhoto => {}
    }
    Value::Object(params)
}

fn optional_string(params: &Value, key: &str) -> Result<Option<String>, ProviderError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ProviderError::InvalidPayload(format!(
            "Parameter '{key}' must be a string"
        ))),
    }
}

fn missing_param(key: &str) -> ProviderError {
    ProviderError::InvalidPayload(format!("Missing required parameter '{key}'"))
}
