//! HTTP API surface

pub mod auth;
pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::{AppState, LlmState};
pub use routes::build_router;
