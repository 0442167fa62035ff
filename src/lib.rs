pub mod api;
pub mod client;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::auth::{AllowAll, StaticTokenAuthorizer, UploadAuthorizer};
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Multipart framing allowance on top of the chunk ceiling
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_chunk_handler,
        api::handlers::upload::complete_upload_handler,
        api::handlers::upload::upload_status_handler,
        api::handlers::upload::abort_upload_handler,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::ChunkUploadForm,
            models::ChunkAck,
            models::CompleteUploadRequest,
            models::CompletedUpload,
            models::UploadStatus,
            models::UploadState,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "upload", description = "Chunked upload endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub authorizer: Arc<dyn UploadAuthorizer>,
}

impl AppState {
    /// Picks the authorizer from the service config: a static bearer token
    /// when `UPLOAD_TOKEN` is set, otherwise every caller is let through.
    pub fn new(uploads: UploadService) -> Self {
        let authorizer: Arc<dyn UploadAuthorizer> = match &uploads.config().upload_token {
            Some(token) => Arc::new(StaticTokenAuthorizer::new(token.clone())),
            None => Arc::new(AllowAll),
        };
        Self {
            uploads,
            authorizer,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.uploads.config().max_chunk_size + MULTIPART_OVERHEAD;
    let origins: Vec<HeaderValue> = state
        .uploads
        .config()
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let upload_routes = Router::new()
        .route(
            "/upload/chunk",
            post(api::handlers::upload::upload_chunk_handler)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/upload/complete",
            post(api::handlers::upload::complete_upload_handler),
        )
        .route(
            "/upload/status/:session_id",
            get(api::handlers::upload::upload_status_handler),
        )
        .route(
            "/upload/:session_id",
            delete(api::handlers::upload::abort_upload_handler),
        )
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .merge(upload_routes)
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
