pub mod auth;
pub mod users;

use axum::Json;
use serde::Serialize;

/// Root status response
#[derive(Serialize)]
pub struct ApiStatus {
    pub api: &'static str,
}

pub async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus { api: "up" })
}
