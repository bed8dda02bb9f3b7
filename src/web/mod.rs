mod handlers;
mod routes;
mod security;

pub use routes::create_router;
