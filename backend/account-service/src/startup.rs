//! HTTP wiring shared by the binary and the integration tests
use actix_cors::Cors;
use actix_web::web;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app_state::AppState;
use crate::error::AppError;
use crate::handlers;
use crate::middleware::{JwtAuth, RateGate};

const JSON_BODY_LIMIT: usize = 16 * 1024;

/// Install the global subscriber. Production logs are JSON lines.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// CORS policy from a comma-separated origin list; `*` allows any origin
pub fn cors(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default();
    for origin in allowed_origins.split(',') {
        let origin = origin.trim();
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else if !origin.is_empty() {
            cors = cors.allowed_origin(origin);
        }
    }

    cors.allow_any_method().allow_any_header().max_age(3600)
}

/// Register every route. The rate gate wraps the API scope, so it runs
/// before any extractor reads a body.
pub fn routes(cfg: &mut web::ServiceConfig, state: web::Data<AppState>, gate: RateGate) {
    let auth = JwtAuth::new(state.tokens.clone());

    cfg.app_data(state)
        .app_data(
            web::JsonConfig::default()
                .limit(JSON_BODY_LIMIT)
                .error_handler(|err, _| AppError::Validation(err.to_string()).into()),
        )
        .app_data(
            web::PathConfig::default()
                .error_handler(|err, _| AppError::Validation(err.to_string()).into()),
        )
        .route("/metrics", web::get().to(handlers::metrics_handler))
        .route("/api/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                .wrap(gate)
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(handlers::register))
                        .route("/login", web::post().to(handlers::login))
                        .route("/verify/{token}", web::get().to(handlers::verify_email))
                        .route("/forgot-password", web::post().to(handlers::forgot_password))
                        .route(
                            "/reset-password/{token}",
                            web::get().to(handlers::reset_password_link),
                        )
                        .route(
                            "/reset-password/{token}",
                            web::post().to(handlers::reset_password),
                        ),
                )
                .service(
                    web::scope("/user")
                        .wrap(auth)
                        .route("/{id}", web::put().to(handlers::edit_user))
                        .route("/{id}", web::delete().to(handlers::delete_user)),
                ),
        );
}
