use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::auth::{SessionStore, UserStore};
use crate::config::ConfigStore;
use crate::error::Result;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Session store
    pub sessions: SessionStore,
    /// User store
    pub users: UserStore,
    /// Fixed password hashing work factor
    pub hash_params: argon2::Params,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
    /// Key signing the session cookie
    cookie_key: Key,
}

impl AppState {
    /// Create new application state from the active configuration
    pub fn new(
        config: ConfigStore,
        sessions: SessionStore,
        users: UserStore,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Arc<Self>> {
        let current = config.get();
        let hash_params = current.auth.hash_params()?;
        let cookie_key = derive_cookie_key(&current.session.secret);

        Ok(Arc::new(Self {
            config,
            sessions,
            users,
            hash_params,
            shutdown_tx,
            cookie_key,
        }))
    }

    pub fn cookie_key(&self) -> &Key {
        &self.cookie_key
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

/// Stretch a secret of any length to the 64 bytes `Key` requires
fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}
