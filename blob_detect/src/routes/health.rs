use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("/health");
    Json(Status {
        status: "Available".into(),
    })
}
