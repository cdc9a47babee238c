use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handler_utils::ApiObject;
use crate::api::proxy::{ai_proxy_handler, method_not_allowed_handler};
use crate::config::AppConfig;
use crate::providers::transport::{ReqwestTransport, SharedHttpTransport};
use crate::providers::{BigModelAdapter, GeminiAdapter, ProviderRegistry};

/// Which providers have a credential. Reported by `/health`; the keys themselves
/// never leave the adapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderAvailability {
    pub gemini: bool,
    pub bigmodel: bool,
}

impl ProviderAvailability {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            gemini: config.gemini.api_key.is_some(),
            bigmodel: config.bigmodel.api_key.is_some(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub providers: ProviderRegistry,
    pub availability: ProviderAvailability,
}

impl AppState {
    pub fn new(providers: ProviderRegistry, availability: ProviderAvailability) -> Self {
        Self {
            service_name: "bingo-tools-backend",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            providers,
            availability,
        }
    }
}

pub fn default_provider_registry(config: &AppConfig) -> ProviderRegistry {
    let transport: SharedHttpTransport = Arc::new(ReqwestTransport::new(config.http_timeout));
    ProviderRegistry::new(
        Arc::new(GeminiAdapter::new(config.gemini.clone(), transport.clone())),
        Arc::new(BigModelAdapter::new(config.bigmodel.clone(), transport)),
    )
}

pub fn build_router(config: &AppConfig) -> Router {
    build_router_with_providers(
        default_provider_registry(config),
        ProviderAvailability::from_config(config),
    )
}

pub fn build_router_with_providers(
    providers: ProviderRegistry,
    availability: ProviderAvailability,
) -> Router {
    let state = AppState::new(providers, availability);
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/ai",
            post(ai_proxy_handler).fallback(method_not_allowed_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: AppConfig) -> std::io::Result<()> {
    let addr: SocketAddr = config.bind;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let availability = ProviderAvailability::from_config(&config);
    let app = build_router(&config);
    info!(
        bind = %addr,
        gemini_configured = availability.gemini,
        bigmodel_configured = availability.bigmodel,
        "starting bingo-tools remote proxy"
    );
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> ApiObject<Value> {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "providers": {
                "gemini": state.availability.gemini,
                "bigmodel": state.availability.bigmodel,
            },
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
