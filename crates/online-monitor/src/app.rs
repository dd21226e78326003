use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{get_chart, get_health, get_metrics, get_online, get_ready};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/online", get(get_online))
        .route("/online/chart", get(get_chart))
        .route("/metrics", get(get_metrics))
        .route("/healthz", get(get_health))
        .route("/readyz", get(get_ready))
        .layer(cors)
        .with_state(state)
}
