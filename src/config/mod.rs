mod schema;
mod store;

pub use schema::{
    AppConfig, AuthConfig, SessionConfig, WebConfig, DEFAULT_SESSION_SECRET,
    MAX_SESSION_AGE_SECS,
};
pub use store::ConfigStore;
