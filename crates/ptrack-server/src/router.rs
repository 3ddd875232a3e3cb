use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{self, AppState};

/// Build the axum router with all ptrack endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/products",
            post(handler::create_product).get(handler::list_products),
        )
        .route("/products/:id", get(handler::get_product))
        .route("/products/:id/retry", post(handler::retry_product))
        .route("/ledger/products/:id", get(handler::ledger_product))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
