use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::User;
use crate::error::Result;
use crate::state::AppState;

/// User as returned to clients
///
/// The password hash is only included when `auth.expose_password_hash` is set.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserResponse {
    pub fn from_user(user: User, expose_password_hash: bool) -> Self {
        Self {
            id: user.id,
            username: user.username,
            password: expose_password_hash.then_some(user.password),
        }
    }
}

/// List all users. Mounted behind `require_login`.
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserResponse>>> {
    let expose = state.config.get().auth.expose_password_hash;
    let users = state.users.list().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| UserResponse::from_user(user, expose))
            .collect(),
    ))
}
