pub mod auth;
pub mod comments;
pub mod dedup;
pub mod error;
pub mod karma;
pub mod models;
pub mod openapi;
pub mod rank;
pub mod repo;
pub mod routes;
pub mod stats;
pub mod submit;
pub mod vote;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
