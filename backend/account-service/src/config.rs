use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetrySettings,
    pub upload: UploadConfig,
    pub s3: S3Config,
    pub email: EmailConfig,
    pub analytics: AnalyticsConfig,
    /// Wall-clock budget for a whole registration (upload + transaction)
    pub register_deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_env")]
    pub env: String,

    #[serde(default = "default_app_host")]
    pub host: String,

    #[serde(default = "default_app_port")]
    pub port: u16,

    /// Comma-separated list of allowed origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_db_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,

    #[serde(default = "default_jwt_token_ttl")]
    pub token_ttl_secs: i64,

    #[serde(default = "default_jwt_cache_ttl")]
    pub cache_ttl_secs: u64,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_argon2_memory_kib")]
    pub memory_kib: u32,

    #[serde(default = "default_argon2_iterations")]
    pub iterations: u32,

    #[serde(default = "default_argon2_parallelism")]
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// One token is added to the bucket every interval
    #[serde(default = "default_rate_limit_refill_ms")]
    pub refill_interval_ms: u64,

    #[serde(default = "default_rate_limit_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_max_bytes")]
    pub max_avatar_bytes: usize,

    #[serde(default = "default_upload_allowed_types")]
    pub allowed_content_types: Vec<String>,

    #[serde(default = "default_upload_timeout_secs")]
    pub rendezvous_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible storage (MinIO, LocalStack)
    pub endpoint: Option<String>,
    /// Base URL objects are served from; the object key is appended
    pub public_base_url: String,
    pub default_avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Empty host puts the mailer in log-only mode
    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    pub smtp_from: String,

    /// Links in outgoing mail point here
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,

    #[serde(default = "default_analytics_queue")]
    pub queue_capacity: usize,
}

// Default value functions
fn default_app_env() -> String {
    "development".to_string()
}

fn default_app_host() -> String {
    "0.0.0.0".to_string()
}

fn default_app_port() -> u16 {
    8080
}

fn default_cors_origins() -> String {
    "*".to_string()
}

fn default_db_max_connections() -> u32 {
    25
}

fn default_db_min_connections() -> u32 {
    5
}

fn default_db_acquire_timeout_secs() -> u64 {
    10
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_max_lifetime_secs() -> u64 {
    300 // 5 minutes
}

fn default_jwt_token_ttl() -> i64 {
    86400 // 24 hours
}

fn default_jwt_cache_ttl() -> u64 {
    86400
}

fn default_argon2_memory_kib() -> u32 {
    19456
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}

fn default_rate_limit_refill_ms() -> u64 {
    100
}

fn default_rate_limit_burst() -> u32 {
    100
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_upload_max_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_upload_allowed_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/gif", "image/webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_upload_timeout_secs() -> u64 {
    20
}

fn default_smtp_port() -> u16 {
    587
}

fn default_analytics_queue() -> usize {
    1024
}

fn default_register_deadline_secs() -> u64 {
    30
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let app = AppConfig {
            env: optional("APP_ENV").unwrap_or_else(default_app_env),
            host: optional("APP_HOST").unwrap_or_else(default_app_host),
            port: parsed("APP_PORT", default_app_port())?,
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(default_cors_origins),
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", default_db_max_connections())?,
            min_connections: parsed("DATABASE_MIN_CONNECTIONS", default_db_min_connections())?,
            acquire_timeout_secs: parsed(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                default_db_acquire_timeout_secs(),
            )?,
            idle_timeout_secs: parsed(
                "DATABASE_IDLE_TIMEOUT_SECS",
                default_db_idle_timeout_secs(),
            )?,
            max_lifetime_secs: parsed(
                "DATABASE_MAX_LIFETIME_SECS",
                default_db_max_lifetime_secs(),
            )?,
        };

        let redis = RedisConfig {
            url: required("REDIS_URL")?,
        };

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            token_ttl_secs: parsed("JWT_TOKEN_TTL_SECS", default_jwt_token_ttl())?,
            cache_ttl_secs: parsed("JWT_CACHE_TTL_SECS", default_jwt_cache_ttl())?,
        };

        let password = PasswordConfig {
            memory_kib: parsed("ARGON2_MEMORY_KIB", default_argon2_memory_kib())?,
            iterations: parsed("ARGON2_ITERATIONS", default_argon2_iterations())?,
            parallelism: parsed("ARGON2_PARALLELISM", default_argon2_parallelism())?,
        };

        let rate_limit = RateLimitConfig {
            refill_interval_ms: parsed("RATE_LIMIT_REFILL_MS", default_rate_limit_refill_ms())?,
            burst: parsed("RATE_LIMIT_BURST", default_rate_limit_burst())?,
        };

        let retry = RetrySettings {
            max_attempts: parsed("DB_RETRY_MAX_ATTEMPTS", default_retry_max_attempts())?,
            base_delay_ms: parsed("DB_RETRY_BASE_DELAY_MS", default_retry_base_delay_ms())?,
        };

        let upload = UploadConfig {
            max_avatar_bytes: parsed("UPLOAD_MAX_AVATAR_BYTES", default_upload_max_bytes())?,
            allowed_content_types: optional("UPLOAD_ALLOWED_TYPES")
                .map(|raw| {
                    raw.split(',')
                        .map(|t| t.trim().to_ascii_lowercase())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_else(default_upload_allowed_types),
            rendezvous_timeout_secs: parsed(
                "UPLOAD_TIMEOUT_SECS",
                default_upload_timeout_secs(),
            )?,
        };

        let s3 = S3Config {
            bucket: required("S3_BUCKET")?,
            region: optional("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: optional("S3_ENDPOINT"),
            public_base_url: required("S3_PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            default_avatar_url: required("DEFAULT_AVATAR_URL")?,
        };

        let email = EmailConfig {
            smtp_host: optional("SMTP_HOST").unwrap_or_default(),
            smtp_port: parsed("SMTP_PORT", default_smtp_port())?,
            smtp_username: optional("SMTP_USERNAME"),
            smtp_password: optional("SMTP_PASSWORD"),
            smtp_from: required("SMTP_FROM")?,
            frontend_url: required("FRONTEND_URL")?
                .trim_end_matches('/')
                .to_string(),
        };

        let analytics = AnalyticsConfig {
            endpoint: optional("ANALYTICS_ENDPOINT"),
            api_key: optional("ANALYTICS_API_KEY"),
            queue_capacity: parsed("ANALYTICS_QUEUE_CAPACITY", default_analytics_queue())?,
        };

        let config = Config {
            app,
            database,
            redis,
            jwt,
            password,
            rate_limit,
            retry,
            upload,
            s3,
            email,
            analytics,
            register_deadline_secs: parsed(
                "REGISTER_DEADLINE_SECS",
                default_register_deadline_secs(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.refill_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_REFILL_MS",
                value: "0".to_string(),
            });
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_BURST",
                value: "0".to_string(),
            });
        }
        if self.jwt.token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_TOKEN_TTL_SECS",
                value: self.jwt.token_ttl_secs.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }

    pub fn register_deadline(&self) -> Duration {
        Duration::from_secs(self.register_deadline_secs)
    }
}

impl RateLimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> resilience::RetryConfig {
        resilience::RetryConfig::linear(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

impl UploadConfig {
    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_secs)
    }
}
