//! Session tokens
//!
//! Tokens are HS256 JWTs carrying a point-in-time snapshot of the account. Only
//! `sub` is authoritative; the profile fields are advisory and go stale as the
//! account changes.
//!
//! Validation first consults the session cache under the raw credential the
//! client presented. A hit skips signature verification, so a cached session
//! stays usable until its cache entry lapses or is purged for the subject.
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::SessionCache;
use crate::config::JwtConfig;
use crate::metrics;
use crate::models::Account;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing credential")]
    Missing,

    #[error("malformed credential")]
    Malformed,

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub bio: String,
    pub website: Option<String>,
    pub phone: String,
    pub language: String,
    pub privacy: bool,
    pub is_verified: bool,
    pub email_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn snapshot(account: &Account, iat: i64, exp: i64) -> Self {
        Claims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            avatar: account.avatar.clone(),
            bio: account.bio.clone(),
            website: account.website.clone(),
            phone: account.phone.clone(),
            language: account.language.clone(),
            privacy: account.privacy,
            is_verified: account.is_verified,
            email_verified: account.email_verified,
            follower_count: account.follower_count,
            following_count: account.following_count,
            iat,
            exp,
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

fn cache_key(credential: &str) -> String {
    format!("token:{}", credential)
}

fn subject_index_key(account_id: i64) -> String {
    format!("token-index:{}", account_id)
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime_secs: i64,
    cache_ttl: Duration,
    cache: Arc<dyn SessionCache>,
    verifications: AtomicU64,
}

impl TokenService {
    pub fn new(config: &JwtConfig, cache: Arc<dyn SessionCache>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            lifetime_secs: config.token_ttl_secs,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache,
            verifications: AtomicU64::new(0),
        }
    }

    /// Sign a fresh token for `account`
    pub fn issue(&self, account: &Account) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        self.sign(&Claims::snapshot(account, now, now + self.lifetime_secs))
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Cryptographic check of signature and expiry, bypassing the cache
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Number of signature verifications performed so far
    pub fn verification_count(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    /// Resolve an `Authorization` header value to claims.
    pub async fn authenticate(&self, credential: &str) -> Result<Claims, TokenError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(TokenError::Missing);
        }

        let key = cache_key(credential);
        let now = Utc::now().timestamp();

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Claims>(&raw) {
                Ok(claims) if claims.exp > now => {
                    metrics::record_cache_lookup("hit");
                    return Ok(claims);
                }
                Ok(_) => metrics::record_cache_lookup("stale"),
                Err(e) => {
                    warn!("Discarding unreadable cached claims: {}", e);
                    metrics::record_cache_lookup("error");
                }
            },
            Ok(None) => metrics::record_cache_lookup("miss"),
            Err(e) => {
                warn!("Session cache lookup failed: {}", e);
                metrics::record_cache_lookup("error");
            }
        }

        let token = credential
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Malformed)?;

        let claims = self.verify(token)?;
        self.remember(&key, &claims, now).await;
        Ok(claims)
    }

    async fn remember(&self, key: &str, claims: &Claims, now: i64) {
        let Some(account_id) = claims.account_id() else {
            return;
        };

        // Never cache past the token's own expiry
        let remaining = Duration::from_secs(claims.exp.saturating_sub(now).max(0) as u64);
        let ttl = remaining.min(self.cache_ttl);
        if ttl.is_zero() {
            return;
        }

        let value = match serde_json::to_string(claims) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize claims for cache: {}", e);
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &value, ttl).await {
            warn!(user_id = account_id, "Failed to cache session: {}", e);
            return;
        }
        if let Err(e) = self
            .cache
            .add_to_index(&subject_index_key(account_id), key, self.cache_ttl)
            .await
        {
            warn!(user_id = account_id, "Failed to index cached session: {}", e);
        }
    }

    /// Drop every cached session of `account_id`. Signed tokens stay
    /// cryptographically valid until they expire.
    pub async fn invalidate_subject(&self, account_id: i64) {
        match self.cache.purge_index(&subject_index_key(account_id)).await {
            Ok(removed) => debug!(user_id = account_id, removed, "Purged cached sessions"),
            Err(e) => warn!(user_id = account_id, "Failed to purge cached sessions: {}", e),
        }
    }
}
