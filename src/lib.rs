pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::{ConfigError, GatewayConfig};
use crate::services::staging::StagingArea;
use crate::services::token_service::TokenService;
use crate::services::visual_search::{BingVisualSearchClient, VisualSearchClient};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Slack on top of the image cap for multipart boundaries and the text fields.
pub const MULTIPART_OVERHEAD: usize = 16 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::login,
        api::handlers::visual_search::visual_search,
        api::handlers::visual_search::visual_search_legacy,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::LoginRequest,
            models::LoginResponse,
            models::AuthFailure,
            models::VisualSearchForm,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "auth", description = "Token issuance"),
        (name = "visual search", description = "Image search through the upstream visual search API"),
        (name = "system", description = "Service health")
    ),
    info(
        title = "Visual Search Gateway",
        description = "Intermediate API that forwards uploaded images to the Bing Visual Search API"
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub tokens: Arc<TokenService>,
    pub staging: Arc<StagingArea>,
    pub upstream: Arc<dyn VisualSearchClient>,
}

impl AppState {
    /// Wire the services described by `config`, talking to the real upstream.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        let upstream = Arc::new(BingVisualSearchClient::new(
            config.upstream_base_url.clone(),
            config.upstream_api_key.clone(),
        ));
        Self::with_upstream(config, upstream)
    }

    pub fn with_upstream(
        config: GatewayConfig,
        upstream: Arc<dyn VisualSearchClient>,
    ) -> Result<Self, ConfigError> {
        let tokens = Arc::new(TokenService::from_config(&config)?);
        let staging = Arc::new(StagingArea::new(
            config.staging_dir.clone(),
            config.max_file_size,
        ));

        Ok(Self {
            config: Arc::new(config),
            tokens,
            staging,
            upstream,
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_file_size + MULTIPART_OVERHEAD;

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(&api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        // Wrong methods on known paths get the same 404 as unknown paths
        .route(
            "/login",
            post(api::handlers::auth::login).fallback(api::handlers::not_found),
        )
        .route(
            "/visualsearch",
            post(api::handlers::visual_search::visual_search)
                .route_layer(DefaultBodyLimit::max(body_limit))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                ))
                .fallback(api::handlers::not_found),
        )
        .route(
            "/api/v1/visualsearch",
            post(api::handlers::visual_search::visual_search_legacy)
                .route_layer(DefaultBodyLimit::max(body_limit))
                .fallback(api::handlers::not_found),
        )
        .fallback(api::handlers::not_found)
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(trace_layer)
        // Outermost, so the trace span already sees a minted request id
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
