//! sessions-api - users API with server-side sessions
//!
//! Users register and log in with a password; a signed cookie carries the
//! id of a session row stored in SQLite, and the users listing is only served
//! to sessions that carry a logged-in user.

pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod web;

pub use error::{AppError, Result};
