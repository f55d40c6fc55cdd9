use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use account_service::cache::RedisSessionCache;
use account_service::config::Config;
use account_service::db::{
    create_pool, run_migrations, AccountStore, PgAccountStore, RetryableTransaction,
};
use account_service::middleware::RateGate;
use account_service::security::{PasswordHasher, TokenService};
use account_service::services::{
    telemetry, AccountService, AccountServiceDeps, MailTemplates, ObjectStore, S3ObjectStore,
    SmtpMailer, TaskExecutor, TelemetryQueue, UploadRendezvous,
};
use account_service::{startup, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    startup::init_tracing(config.is_production());

    tracing::info!("Starting account-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    tracing::info!(
        "Database pool created with {} max connections",
        config.database.max_connections
    );

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool));

    let cache = RedisSessionCache::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let tokens = Arc::new(TokenService::new(&config.jwt, Arc::new(cache)));

    let sink = telemetry::sink_from_config(&config.analytics)?;
    let (telemetry, telemetry_worker) =
        TelemetryQueue::start(sink, config.analytics.queue_capacity);

    let (tasks, reporter) = TaskExecutor::new();
    let reporter_handle = tokio::spawn(reporter.run());

    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_config(&config.s3).await);
    tracing::info!(bucket = %config.s3.bucket, "Object storage configured");

    let accounts = AccountService::new(AccountServiceDeps {
        store: store.clone(),
        transactions: RetryableTransaction::new(
            config.retry.to_retry_config(),
            Arc::new(telemetry),
        ),
        tokens: tokens.clone(),
        passwords: PasswordHasher::new(&config.password)?,
        uploads: UploadRendezvous::from_config(objects, &config.upload, &config.s3),
        mailer: Arc::new(SmtpMailer::new(&config.email)?),
        templates: MailTemplates::new(&config.email.frontend_url),
        tasks,
        register_deadline: config.register_deadline(),
    });

    let state = web::Data::new(AppState {
        accounts: Arc::new(accounts),
        tokens,
        store,
        max_avatar_bytes: config.upload.max_avatar_bytes,
    });
    let gate = RateGate::new(&config.rate_limit)?;
    let origins = config.app.cors_allowed_origins.clone();
    let bind_address = (config.app.host.clone(), config.app.port);

    tracing::info!("Listening on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || {
        App::new()
            .wrap(startup::cors(&origins))
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(|cfg| startup::routes(cfg, state.clone(), gate.clone()))
    })
    .bind(bind_address)?
    .run()
    .await?;

    tracing::info!("Server shutting down. Draining background work...");

    // Both workers stop once the last sender, owned by the app state, is gone
    for (name, handle) in [("telemetry", telemetry_worker), ("task reporter", reporter_handle)] {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(())) => tracing::info!("{} worker shut down gracefully", name),
            Ok(Err(e)) => tracing::error!("{} worker panicked: {:?}", name, e),
            Err(_) => tracing::warn!("{} worker did not shut down within timeout", name),
        }
    }

    Ok(())
}
