use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::users::UserResponse;
use crate::auth::{hash_password, verify_password, Session};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub saved: UserResponse,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let hash = hash_password(&req.password, &state.hash_params)?;
    let user = state.users.create(&req.username, &hash).await?;
    info!("Registered user '{}' (id {})", user.username, user.id);

    let expose = state.config.get().auth.expose_password_hash;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            saved: UserResponse::from_user(user, expose),
        }),
    ))
}

/// Authenticate and attach the user to the session
///
/// The session is committed by the middleware after this returns. A failed
/// commit is logged there; the client still gets this response, without a cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<Credentials>,
) -> Result<Json<MessageResponse>> {
    // Unknown user and wrong password look the same to the caller
    let user = state
        .users
        .find_by_username(&req.username)
        .await?
        .filter(|user| verify_password(&req.password, &user.password))
        .ok_or(AppError::InvalidCredentials)?;

    session.set_user(&user.username);
    info!("User '{}' logged in", user.username);

    Ok(Json(MessageResponse {
        message: "welcome!",
    }))
}

pub async fn logout(Extension(session): Extension<Session>) -> Result<&'static str> {
    let user = session.user();
    session.destroy().await?;
    if let Some(user) = user {
        info!("User '{}' logged out", user);
    }
    Ok("logged out")
}
