mod password;
mod session;
mod user;
pub mod middleware;

pub use password::{hash_password, verify_password};
pub use session::{SessionRecord, SessionStore};
pub use user::{User, UserStore};
pub use middleware::{require_login, session_middleware, Session, USER_KEY};
