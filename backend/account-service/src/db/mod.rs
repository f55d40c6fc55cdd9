use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::models::{Account, NewAccount, NewNotification};

pub mod account_repo;
pub mod transaction;

pub use account_repo::PgAccountStore;
pub use transaction::RetryableTransaction;

/// Storage outcome distinction: business misses and conflicts are final,
/// backend failures are candidates for retry.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(conflicting_field(db.constraint()))
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn conflicting_field(constraint: Option<&str>) -> &'static str {
    match constraint.unwrap_or_default() {
        c if c.contains("email") => "email",
        c if c.contains("username") => "username",
        c if c.contains("phone") => "phone",
        c if c.contains("token") => "token",
        _ => "record",
    }
}

/// Account persistence. Every method is one unit of work committed in a single
/// database transaction, so a caller may safely re-run it after a backend error.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError>;

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError>;

    /// Look up the account holding `token`, mark its email verified and replace
    /// the token with `next_token`.
    async fn verify_email(&self, token: &str, next_token: &str) -> Result<Account, StoreError>;

    /// Issue `next_token` as the reset token for the account owning `email`.
    async fn rotate_token_by_email(
        &self,
        email: &str,
        next_token: &str,
    ) -> Result<Account, StoreError>;

    /// Look up the account holding `token`, replace the token and optionally the
    /// password digest.
    async fn consume_token(
        &self,
        token: &str,
        next_token: &str,
        password_digest: Option<&str>,
    ) -> Result<Account, StoreError>;

    /// Persist the mutable profile columns of `account`.
    async fn update(&self, account: &Account) -> Result<Account, StoreError>;

    /// Insert `notice`, then remove the account with every record it owns and
    /// every follow edge pointing at it.
    async fn delete_with_cascade(&self, id: i64, notice: &NewNotification)
        -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(&config.url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
