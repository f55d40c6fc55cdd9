/// Password hashing and verification using Argon2id
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::{ConfigError, PasswordConfig};
use crate::error::{AppError, Result};

/// Argon2id hasher with configured cost parameters.
///
/// Hashing is CPU bound, so both operations run on the blocking pool.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> std::result::Result<Self, ConfigError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| ConfigError::Invalid {
            key: "ARGON2_PARAMS",
            value: e.to_string(),
        })?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// PHC-formatted digest of `password` with a fresh random salt
    pub async fn hash(&self, password: &str) -> Result<String> {
        let hasher = self.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .argon2()
                .hash_password(password.as_bytes(), &salt)
                .map(|digest| digest.to_string())
                .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// Constant-time comparison of `password` against a stored digest
    pub async fn verify(&self, password: &str, digest: &str) -> Result<bool> {
        let hasher = self.clone();
        let password = password.to_owned();
        let digest = digest.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&digest).map_err(|e| {
                AppError::Internal(format!("Invalid password hash format: {}", e))
            })?;

            match hasher.argon2().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AppError::Internal(format!(
                    "Password verification failed: {}",
                    e
                ))),
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
    }
}
