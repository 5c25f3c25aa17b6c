mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use log::warn;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;
pub use self::types::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::analyze_handler,
        api::history_handler,
        api::upload_handler,
        api::find_similar_handler,
    ),
    components(schemas(types::AnalyzeForm, types::ImageForm))
)]
pub struct ApiDoc;

/// 构建跨域配置，允许携带凭据时方法与请求头按请求回显
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }
    let origins = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("无效的跨域来源: {origin}");
                None
            }
        })
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(state.conf_dir.image_dir());
    let cors = cors_layer(&state.http.cors_origins);
    let limit = state.http.max_upload * 1024 * 1024;

    Router::new()
        .route("/api/analyze", post(api::analyze_handler))
        .route("/api/history", get(api::history_handler))
        .route("/api/upload", post(api::upload_handler))
        .route("/api/find_similar", post(api::find_similar_handler))
        .nest_service("/static/images", static_dir)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(cors)
        .with_state(state)
}
