pub mod auth;
pub mod bulk;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod sweep;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
