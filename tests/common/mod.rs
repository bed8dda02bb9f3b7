#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

use sessions_api::auth::{SessionStore, UserStore};
use sessions_api::config::{AppConfig, ConfigStore};
use sessions_api::state::AppState;
use sessions_api::web::create_router;

/// A router over a throwaway SQLite database
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

/// Build the full application with default settings
pub async fn build_test_app() -> TestApp {
    build_test_app_with(|_| {}).await
}

/// Build the full application, adjusting the config first
///
/// Password hashing uses a light work factor to keep tests fast.
pub async fn build_test_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config_store = ConfigStore::new(&dir.path().join("test.db")).await.unwrap();

    let mut config = (*config_store.get()).clone();
    config.auth.hash_memory_kib = 1024;
    config.auth.hash_iterations = 1;
    configure(&mut config);
    config_store.set_runtime(config.clone()).unwrap();

    let sessions = SessionStore::new(config_store.pool().clone(), &config.session);
    sessions.init_schema().await.unwrap();
    let users = UserStore::new(config_store.pool().clone());
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = AppState::new(config_store, sessions, users, shutdown_tx).unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn register(&self, username: &str, password: &str) -> Response<Body> {
        self.post_json(
            "/api/auth/register",
            serde_json::json!({ "username": username, "password": password }),
            None,
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Response<Body> {
        self.post_json(
            "/api/auth/login",
            serde_json::json!({ "username": username, "password": password }),
            None,
        )
        .await
    }

    /// Register, log in and return the session cookie
    pub async fn logged_in(&self, username: &str, password: &str) -> String {
        assert_eq!(self.register(username, password).await.status(), StatusCode::CREATED);
        let response = self.login(username, password).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("login must set the session cookie")
    }
}

/// `name=value` of the session cookie set by a response, if any
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("chocolate-chip="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Raw `Set-Cookie` header for the session cookie
pub fn session_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("chocolate-chip="))
        .map(str::to_string)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
