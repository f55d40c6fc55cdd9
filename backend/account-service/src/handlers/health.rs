use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::app_state::AppState;
use crate::metrics;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
}

/// Liveness plus a storage round trip
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            database: "healthy",
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Health check storage ping failed");
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "degraded",
                version: env!("CARGO_PKG_VERSION"),
                database: "unhealthy",
            })
        }
    }
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::gather_metrics())
}
