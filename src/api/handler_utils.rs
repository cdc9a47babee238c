use axum::http::StatusCode;
use axum::Json;
use tracing::{error, warn};

use crate::api::error::ErrorKind;
use crate::api::response::{ProxyEnvelope, ProxyJson};
use crate::providers::ProviderError;

pub type ApiObject<T> = (StatusCode, Json<T>);

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ProxyJson {
    (
        status,
        Json(ProxyEnvelope {
            success: false,
            data: None,
            error: Some(message.into()),
            error_kind: Some(kind),
            error_code: Some(code.into()),
        }),
    )
}

pub fn bad_request(code: &str, message: impl Into<String>) -> ProxyJson {
    error_response(StatusCode::BAD_REQUEST, ErrorKind::Validation, code, message)
}

/// Caller mistakes become 400 with the adapter's text; everything else is a 500 that
/// still carries the provider message, as browser clients show it verbatim.
pub fn map_provider_error(err: ProviderError) -> ProxyJson {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    if status.is_server_error() {
        warn!(error_code = err.code(), error = %err, "provider call failed");
    }
    error_response(status, err.kind(), err.code(), err.to_string())
}

pub fn internal_error(message: impl Into<String>) -> ProxyJson {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}
