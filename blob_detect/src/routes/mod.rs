mod analyze_image;
mod health;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use analyze_image::{InvokeRequest, InvokeResponse, FUNCTION_NAME};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route(&format!("/{}", FUNCTION_NAME), post(analyze_image::analyze_image))
}
