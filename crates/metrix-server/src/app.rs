use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// HTTP router with the full middleware stack, outermost first:
/// response compression, request decompression, request logging, trusted
/// subnet check, response signing.
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::sign_response_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trusted_subnet_middleware,
        ))
        .with_state(state)
        .layer(axum::middleware::from_fn(logging::request_logging))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
}
