//! Account lifecycle and authentication service
//!
//! Registration with email verification, login, password reset, profile edits
//! and cascading account deletion over PostgreSQL, with session tokens cached
//! in Redis and avatars stored in S3-compatible object storage.
pub mod app_state;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod security;
pub mod services;
pub mod startup;

pub use app_state::AppState;
pub use config::Config;
pub use error::{AppError, Result};
