use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::session::{SessionRecord, SessionStore};
use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Session data key holding the logged-in username
pub const USER_KEY: &str = "user";

/// Request-scoped handle to the caller's session
///
/// Installed by [`session_middleware`] and taken by handlers as
/// `Extension<Session>`. Clones share the same state; the middleware reads it
/// back once the handler has finished and decides what to persist.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    store: SessionStore,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    data: Map<String, Value>,
    is_new: bool,
    modified: bool,
    destroyed: bool,
}

/// What the middleware must do with a session after the handler ran
#[derive(Debug, PartialEq)]
enum Outcome {
    /// Write data and (re)issue the cookie
    Save(String, Map<String, Value>),
    /// Extend the stored expiry only
    Touch(String),
    /// Row already deleted; clear the cookie
    Destroyed,
    /// New session nobody wrote to
    Discard,
}

impl Session {
    fn new(record: SessionRecord, is_new: bool, store: SessionStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id: record.id,
                data: record.data,
                is_new,
                modified: false,
                destroyed: false,
            })),
            store,
        }
    }

    /// Session ID
    pub fn id(&self) -> String {
        self.inner.lock().id.clone()
    }

    /// True until the session has been saved once
    pub fn is_new(&self) -> bool {
        self.inner.lock().is_new
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().data.get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock();
        inner.data.insert(key.to_string(), value);
        inner.modified = true;
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.modified = true;
        }
        removed
    }

    /// Authenticated username, if any
    ///
    /// A session without a non-empty `user` string is anonymous.
    pub fn user(&self) -> Option<String> {
        match self.inner.lock().data.get(USER_KEY) {
            Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
            _ => None,
        }
    }

    /// Mark the session as belonging to `username`
    pub fn set_user(&self, username: &str) {
        self.insert(USER_KEY, Value::String(username.to_string()));
    }

    /// Delete the session from the store now
    ///
    /// Nothing is committed for this session afterwards and the cookie is cleared.
    pub async fn destroy(&self) -> Result<()> {
        let id = {
            let inner = self.inner.lock();
            if inner.destroyed {
                return Ok(());
            }
            inner.id.clone()
        };

        self.store
            .destroy(&id)
            .await
            .map_err(|e| AppError::SessionDestroy(e.to_string()))?;

        let mut inner = self.inner.lock();
        inner.destroyed = true;
        inner.data.clear();
        Ok(())
    }

    fn outcome(&self, save_uninitialized: bool) -> Outcome {
        let inner = self.inner.lock();
        if inner.destroyed {
            Outcome::Destroyed
        } else if inner.modified || (inner.is_new && save_uninitialized) {
            Outcome::Save(inner.id.clone(), inner.data.clone())
        } else if inner.is_new {
            Outcome::Discard
        } else {
            Outcome::Touch(inner.id.clone())
        }
    }
}

fn session_cookie(config: &SessionConfig, id: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), id))
        .path("/")
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(config.max_age()))
        .build()
}

/// Resolve the session cookie, run the handler, then commit the session
///
/// Store failures while committing are logged; the handler's response stands.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = state.config.get();
    let settings = &config.session;
    let jar = SignedCookieJar::from_headers(request.headers(), state.cookie_key().clone());

    // Cookies with a bad signature are simply not returned by the jar
    let existing = match jar.get(&settings.cookie_name) {
        Some(cookie) => match state.sessions.get(cookie.value()).await {
            Ok(record) => record,
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    let session = match existing {
        Some(record) => {
            tracing::debug!("Resolved session {}", record.id);
            Session::new(record, false, state.sessions.clone())
        }
        None => Session::new(state.sessions.fresh(), true, state.sessions.clone()),
    };

    request.extensions_mut().insert(session.clone());
    let response = next.run(request).await;

    let jar = match session.outcome(settings.save_uninitialized) {
        Outcome::Save(id, data) => match state.sessions.save(&id, &data).await {
            Ok(_) => jar.add(session_cookie(settings, id)),
            Err(e) => {
                tracing::error!("Failed to save session {}: {}", id, e);
                jar
            }
        },
        Outcome::Touch(id) => {
            if let Err(e) = state.sessions.touch(&id).await {
                tracing::warn!("Failed to touch session {}: {}", id, e);
            }
            jar
        }
        Outcome::Destroyed => {
            jar.remove(Cookie::build((settings.cookie_name.clone(), "")).path("/"))
        }
        Outcome::Discard => jar,
    };

    (jar, response).into_response()
}

/// Only let requests with a logged-in session through
pub async fn require_login(
    Extension(session): Extension<Session>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if session.user().is_none() {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    async fn test_store() -> (SessionStore, TempDir) {
        let dir = tempdir().unwrap();
        let config = ConfigStore::new(&dir.path().join("test.db")).await.unwrap();
        let store = SessionStore::new(config.pool().clone(), &config.get().session);
        store.init_schema().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_untouched_fresh_session_is_discarded() {
        let (store, _dir) = test_store().await;
        let session = Session::new(store.fresh(), true, store.clone());

        assert!(session.is_new());
        assert_eq!(session.outcome(false), Outcome::Discard);
        assert!(matches!(session.outcome(true), Outcome::Save(..)));
    }

    #[tokio::test]
    async fn test_mutation_is_saved() {
        let (store, _dir) = test_store().await;
        let session = Session::new(store.fresh(), true, store.clone());

        session.set_user("ana");
        assert_eq!(session.user().as_deref(), Some("ana"));
        assert_eq!(session.get(USER_KEY), Some(json!("ana")));
        match session.outcome(false) {
            Outcome::Save(id, data) => {
                assert_eq!(id, session.id());
                assert_eq!(data.get(USER_KEY), Some(&json!("ana")));
            }
            other => panic!("expected save, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolved_unmodified_session_is_touched() {
        let (store, _dir) = test_store().await;
        let record = store.save("abc", &Map::new()).await.unwrap();
        let session = Session::new(record, false, store.clone());

        assert_eq!(session.outcome(false), Outcome::Touch("abc".to_string()));

        // Removing a missing key changes nothing
        assert!(session.remove("missing").is_none());
        assert_eq!(session.outcome(false), Outcome::Touch("abc".to_string()));
    }

    #[tokio::test]
    async fn test_only_non_empty_user_authenticates() {
        let (store, _dir) = test_store().await;
        let session = Session::new(store.fresh(), true, store.clone());

        assert!(session.user().is_none());
        session.insert(USER_KEY, json!(""));
        assert!(session.user().is_none());
        session.insert(USER_KEY, json!(42));
        assert!(session.user().is_none());
        session.insert("cart", json!(["apple"]));
        assert!(session.user().is_none());
        session.set_user("ana");
        assert_eq!(session.user().as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_destroy_removes_row() {
        let (store, _dir) = test_store().await;
        let mut data = Map::new();
        data.insert(USER_KEY.to_string(), json!("ana"));
        let record = store.save("abc", &data).await.unwrap();
        let session = Session::new(record, false, store.clone());

        session.destroy().await.unwrap();
        assert!(session.user().is_none());
        assert_eq!(session.outcome(false), Outcome::Destroyed);
        assert!(store.get("abc").await.unwrap().is_none());

        // Second destroy is a no-op
        session.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_reports_store_failure() {
        let dir = tempdir().unwrap();
        let config = ConfigStore::new(&dir.path().join("test.db")).await.unwrap();
        let store = SessionStore::new(config.pool().clone(), &config.get().session);
        store.init_schema().await.unwrap();
        let session = Session::new(store.fresh(), true, store.clone());

        config.pool().close().await;
        let err = session.destroy().await.unwrap_err();
        assert!(matches!(err, AppError::SessionDestroy(_)));
        assert_ne!(session.outcome(false), Outcome::Destroyed);
    }

    #[test]
    fn test_cookie_attributes_follow_config() {
        let mut config = SessionConfig::default();
        let cookie = session_cookie(&config, "abc".to_string());
        assert_eq!(cookie.name(), "chocolate-chip");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));

        config.secure = true;
        let cookie = session_cookie(&config, "abc".to_string());
        assert_eq!(cookie.secure(), Some(true));
    }
}
