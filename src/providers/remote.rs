use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::pipeline::ImagePayload;
use crate::providers::actions::action_params;
use crate::providers::transport::{JsonRequest, RequestAuth, SharedHttpTransport};
use crate::providers::{
    ProviderAdapter, ProviderError, ProviderKind, ProviderOperation, ProviderOutput,
};

#[derive(Debug, Deserialize)]
struct ProxyReply {
    #[serde(default)]
    success: bool,
    data: Option<Value>,
    error: Option<String>,
}

/// Runs operations through a Remote Proxy so the caller never holds provider keys.
pub struct RemoteProxyAdapter {
    endpoint: String,
    service: ProviderKind,
    transport: SharedHttpTransport,
}

impl RemoteProxyAdapter {
    pub fn new(
        endpoint: impl Into<String>,
        service: ProviderKind,
        transport: SharedHttpTransport,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            service,
            transport,
        }
    }
}

impl ProviderAdapter for RemoteProxyAdapter {
    fn kind(&self) -> ProviderKind {
        self.service
    }

    fn run(
        &self,
        operation: &ProviderOperation,
        source: Option<&ImagePayload>,
    ) -> Result<ProviderOutput, ProviderError> {
        if operation.needs_source() {
            crate::providers::require_source(operation, source)?;
        }
        info!(
            service = self.service.as_str(),
            action = operation.action(),
            endpoint = %self.endpoint,
            "forwarding operation to remote proxy"
        );
        let reply = self.transport.post_json(&JsonRequest {
            url: self.endpoint.clone(),
            auth: RequestAuth::None,
            body: json!({
                "service": self.service.as_str(),
                "action": operation.action(),
                "params": action_params(operation, source),
            }),
        })?;

        if !reply.is_success() {
            let message = reply
                .decode_json::<ProxyReply>("proxy")
                .ok()
                .and_then(|decoded| decoded.error)
                .unwrap_or_else(|| format!("proxy returned HTTP {}", reply.status));
            return Err(match reply.status {
                400..=499 => ProviderError::InvalidPayload(message),
                _ => ProviderError::Response(message),
            });
        }

        let decoded: ProxyReply = reply.decode_json("proxy")?;
        if !decoded.success {
            return Err(ProviderError::Response(
                decoded
                    .error
                    .unwrap_or_else(|| String::from("proxy reported failure")),
            ));
        }

        let data = decoded
            .data
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Response(String::from("No image generated")))?;
        let payload = ImagePayload::from_data_uri(data).map_err(ProviderError::invalid_image)?;
        Ok(ProviderOutput::image(payload))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pipeline::ImageMime;
    use crate::providers::transport::fake::FakeTransport;
    use crate::providers::transport::HttpReply;

    fn source() -> ImagePayload {
        ImagePayload::new(ImageMime::Png, vec![1, 2, 3])
    }

    #[test]
    fn posts_service_action_and_params() {
        let result = ImagePayload::new(ImageMime::Png, vec![4, 5]);
        let transport = FakeTransport::with_replies([Ok(HttpReply::json(
            200,
            &json!({"success": true, "data": result.to_data_uri()}),
        ))]);
        let adapter = RemoteProxyAdapter::new(
            "http://127.0.0.1:8787/api/ai",
            ProviderKind::BigModel,
            Arc::new(transport.clone()),
        );

        let out = adapter
            .remove_object(&source(), "watermark")
            .expect("proxy call");
        assert_eq!(out, result);

        let seen = transport.take_seen();
        assert_eq!(seen[0].url, "http://127.0.0.1:8787/api/ai");
        assert_eq!(seen[0].auth, RequestAuth::None);
        assert_eq!(
            seen[0].body,
            json!({
                "service": "bigmodel",
                "action": "removeObject",
                "params": {"image": source().to_data_uri(), "description": "watermark"}
            })
        );
    }

    #[test]
    fn proxy_errors_keep_their_message() {
        let transport = FakeTransport::with_replies([Ok(HttpReply::json(
            500,
            &json!({"success": false, "error": "BIGMODEL_API_KEY not configured"}),
        ))]);
        let adapter = RemoteProxyAdapter::new(
            "http://proxy/api/ai",
            ProviderKind::BigModel,
            Arc::new(transport),
        );

        let err = adapter.upscale(&source()).expect_err("proxy failed");
        assert!(matches!(err, ProviderError::Response(_)));
        assert_eq!(err.to_string(), "BIGMODEL_API_KEY not configured");
    }

    #[test]
    fn non_json_gateway_error_keeps_http_status() {
        let transport = FakeTransport::with_replies([Ok(HttpReply {
            status: 502,
            content_type: Some(String::from("text/html")),
            body: b"<html><body>Bad Gateway</body></html>".to_vec(),
        })]);
        let adapter =
            RemoteProxyAdapter::new("http://proxy/api/ai", ProviderKind::Gemini, Arc::new(transport));

        let err = adapter.upscale(&source()).expect_err("gateway failed");
        assert!(matches!(err, ProviderError::Response(_)));
        assert_eq!(err.to_string(), "proxy returned HTTP 502");
    }

    #[test]
    fn client_errors_map_to_invalid_payload() {
        let transport = FakeTransport::with_replies([Ok(HttpReply::json(
            400,
            &json!({"success": false, "error": "Invalid service"}),
        ))]);
        let adapter =
            RemoteProxyAdapter::new("http://proxy/api/ai", ProviderKind::Gemini, Arc::new(transport));

        let err = adapter.restore_photo(&source()).expect_err("bad request");
        assert!(matches!(err, ProviderError::InvalidPayload(_)));
    }
}
