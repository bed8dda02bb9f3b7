use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::security::with_security_headers;
use crate::auth::{require_login, session_middleware};
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/logout", get(handlers::auth::logout));

    // Every users route requires a logged-in session
    let user_routes = Router::new()
        .route("/", get(handlers::users::list_users))
        .route_layer(middleware::from_fn(require_login));

    let app = Router::new()
        .route("/", get(handlers::api_status))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    with_security_headers(app)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
