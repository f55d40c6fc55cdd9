/// PostgreSQL account store
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{AccountStore, StoreError};
use crate::models::{Account, NewAccount, NewNotification};

const ACCOUNT_COLUMNS: &str = "id, username, name, email, phone, password_digest, bio, website, \
     avatar, language, privacy, is_verified, email_verified, token, follower_count, \
     following_count, post_count, created_at, updated_at";

/// Statements run after the notification insert, in order. Counterpart counters
/// are adjusted before the edges and interactions they count disappear.
const CASCADE_STATEMENTS: [(&str, &str); 12] = [
    (
        "follower counters",
        "UPDATE users SET follower_count = GREATEST(follower_count - 1, 0) \
         WHERE id IN (SELECT followed_id FROM follows WHERE follower_id = $1) AND id <> $1",
    ),
    (
        "following counters",
        "UPDATE users SET following_count = GREATEST(following_count - 1, 0) \
         WHERE id IN (SELECT follower_id FROM follows WHERE followed_id = $1) AND id <> $1",
    ),
    (
        "like counters",
        "UPDATE posts SET like_count = GREATEST(like_count - 1, 0) \
         WHERE id IN (SELECT post_id FROM likes WHERE user_id = $1) AND user_id <> $1",
    ),
    (
        "comment counters",
        "UPDATE posts p SET comment_count = GREATEST(p.comment_count - c.n, 0) \
         FROM (SELECT post_id, COUNT(*) AS n FROM comments WHERE user_id = $1 GROUP BY post_id) c \
         WHERE p.id = c.post_id AND p.user_id <> $1",
    ),
    (
        "likes",
        "DELETE FROM likes WHERE user_id = $1 \
         OR post_id IN (SELECT id FROM posts WHERE user_id = $1)",
    ),
    (
        "comments",
        "DELETE FROM comments WHERE user_id = $1 \
         OR post_id IN (SELECT id FROM posts WHERE user_id = $1)",
    ),
    (
        "saved posts",
        "DELETE FROM saved_posts WHERE user_id = $1 \
         OR post_id IN (SELECT id FROM posts WHERE user_id = $1)",
    ),
    ("stories", "DELETE FROM stories WHERE user_id = $1"),
    ("highlights", "DELETE FROM highlights WHERE user_id = $1"),
    ("posts", "DELETE FROM posts WHERE user_id = $1"),
    (
        "follows",
        "DELETE FROM follows WHERE follower_id = $1 OR followed_id = $1",
    ),
    ("account", "DELETE FROM users WHERE id = $1"),
];

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let created = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (username, name, email, phone, password_digest, bio, website,
                               avatar, language, privacy, token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.username)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.password_digest)
        .bind(&account.bio)
        .bind(&account.website)
        .bind(&account.avatar)
        .bind(&account.language)
        .bind(account.privacy)
        .bind(&account.token)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(created)
    }

    async fn verify_email(&self, token: &str, next_token: &str) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET email_verified = TRUE, is_verified = TRUE, token = $2, updated_at = NOW()
            WHERE token = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(token)
        .bind(next_token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn rotate_token_by_email(
        &self,
        email: &str,
        next_token: &str,
    ) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE users SET token = $2, updated_at = NOW() WHERE email = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .bind(next_token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn consume_token(
        &self,
        token: &str,
        next_token: &str,
        password_digest: Option<&str>,
    ) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET token = $2,
                password_digest = COALESCE($3, password_digest),
                updated_at = NOW()
            WHERE token = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(token)
        .bind(next_token)
        .bind(password_digest)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn update(&self, account: &Account) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET name = $2, email = $3, phone = $4, password_digest = $5, bio = $6,
                website = $7, avatar = $8, language = $9, privacy = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.password_digest)
        .bind(&account.bio)
        .bind(&account.website)
        .bind(&account.avatar)
        .bind(&account.language)
        .bind(account.privacy)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn delete_with_cascade(
        &self,
        id: i64,
        notice: &NewNotification,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        sqlx::query(
            r#"
            INSERT INTO notifications (from_user_id, to_user_id, type, context, priority, group_id, read)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notice.from_user_id)
        .bind(notice.to_user_id)
        .bind(&notice.kind)
        .bind(&notice.context)
        .bind(notice.priority)
        .bind(&notice.group_id)
        .bind(notice.read)
        .execute(&mut *tx)
        .await?;

        for (label, statement) in CASCADE_STATEMENTS {
            let result = sqlx::query(statement).bind(id).execute(&mut *tx).await?;
            debug!(user_id = id, rows = result.rows_affected(), "cascade: {}", label);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
