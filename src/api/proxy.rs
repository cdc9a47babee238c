use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{bad_request, error_response, internal_error, map_provider_error};
use crate::api::response::{success, ProxyJson};
use crate::api::server::AppState;
use crate::providers::actions::parse_action;
use crate::providers::ProviderKind;

const MISSING_PARAMETERS: &str = "Missing required parameters";

/// `POST /api/ai`: `{service, action, params}` in, `{success, data | error}` out.
pub async fn ai_proxy_handler(State(state): State<AppState>, body: Bytes) -> ProxyJson {
    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("missing_parameters", MISSING_PARAMETERS);
    };
    let (Some(service), Some(action)) = (
        required_field(&request, "service"),
        required_field(&request, "action"),
    ) else {
        return bad_request("missing_parameters", MISSING_PARAMETERS);
    };
    let Ok(provider) = service.parse::<ProviderKind>() else {
        return bad_request("invalid_service", "Invalid service");
    };

    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let parsed = match parse_action(provider, action, &params) {
        Ok(parsed) => parsed,
        Err(err) => return map_provider_error(err),
    };
    info!(
        service = provider.as_str(),
        action = parsed.operation.action(),
        source_bytes = parsed.source.as_ref().map_or(0, |image| image.len()),
        "proxying image operation"
    );

    let adapter = state.providers.get(provider);
    let outcome = tokio::task::spawn_blocking(move || {
        adapter.run(&parsed.operation, parsed.source.as_ref())
    })
    .await;

    match outcome {
        Ok(Ok(output)) => {
            debug!(
                service = provider.as_str(),
                bytes = output.payload.len(),
                mime = %output.payload.mime(),
                "provider returned image"
            );
            success(output.payload.to_data_uri())
        }
        Ok(Err(err)) => map_provider_error(err),
        Err(join_error) => internal_error(format!("provider task failed: {join_error}")),
    }
}

pub async fn method_not_allowed_handler() -> ProxyJson {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorKind::Validation,
        "method_not_allowed",
        "Method not allowed",
    )
}

fn required_field<'a>(request: &'a Value, key: &str) -> Option<&'a str> {
    request
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
