use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::error::ErrorKind;

/// Wire shape of every `/api/ai` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

pub type ProxyJson = (StatusCode, Json<ProxyEnvelope>);

pub fn success(data: impl Into<String>) -> ProxyJson {
    (
        StatusCode::OK,
        Json(ProxyEnvelope {
            success: true,
            data: Some(data.into()),
            error: None,
            error_kind: None,
            error_code: None,
        }),
    )
}
