use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Persisted account row.
///
/// Deliberately not `Serialize`: the password digest and the single-use token
/// leave the process only through [`AccountView`] or [`ProfileSummary`].
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_digest: String,
    pub bio: String,
    pub website: Option<String>,
    pub avatar: String,
    pub language: String,
    pub privacy: bool,
    pub is_verified: bool,
    pub email_verified: bool,
    pub token: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for registration
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_digest: String,
    pub bio: String,
    pub website: Option<String>,
    pub avatar: String,
    pub language: String,
    pub privacy: bool,
    pub token: String,
}

/// Public profile returned after verification, login and reset
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub bio: String,
    pub website: Option<String>,
    pub avatar: String,
    pub language: String,
    pub privacy: bool,
    pub is_verified: bool,
    pub email_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        AccountView {
            id: account.id,
            username: account.username.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            bio: account.bio.clone(),
            website: account.website.clone(),
            avatar: account.avatar.clone(),
            language: account.language.clone(),
            privacy: account.privacy,
            is_verified: account.is_verified,
            email_verified: account.email_verified,
            follower_count: account.follower_count,
            following_count: account.following_count,
            post_count: account.post_count,
            created_at: account.created_at,
        }
    }
}

/// Redacted view returned by profile edits
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: String,
    pub avatar: String,
}

impl From<&Account> for ProfileSummary {
    fn from(account: &Account) -> Self {
        ProfileSummary {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            bio: account.bio.clone(),
            avatar: account.avatar.clone(),
        }
    }
}
