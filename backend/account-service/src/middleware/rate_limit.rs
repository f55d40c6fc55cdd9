//! Shared token-bucket gate in front of every API route
//!
//! One bucket serves the whole process. It is consulted before the request
//! body is read, so a rejected request never reaches a handler or storage.
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::LocalBoxFuture;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ConfigError, RateLimitConfig};
use crate::error::AppError;
use crate::metrics::RATE_LIMIT_REJECTIONS_TOTAL;

/// Governor's direct limiter behind a closure to keep its generics out of the
/// middleware types
#[derive(Clone)]
pub struct RateGate {
    check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        let burst = NonZeroU32::new(config.burst).ok_or(ConfigError::Invalid {
            key: "RATE_LIMIT_BURST",
            value: config.burst.to_string(),
        })?;
        let quota = Quota::with_period(config.refill_interval())
            .ok_or(ConfigError::Invalid {
                key: "RATE_LIMIT_REFILL_MS",
                value: config.refill_interval_ms.to_string(),
            })?
            .allow_burst(burst);

        let limiter = RateLimiter::direct(quota);
        Ok(Self {
            check: Arc::new(move || limiter.check().is_ok()),
        })
    }

    /// Take one token if available
    pub fn allow(&self) -> bool {
        (self.check)()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = RateGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RateGateService {
            service: Rc::new(service),
            gate: self.clone(),
        }))
    }
}

pub struct RateGateService<S> {
    service: Rc<S>,
    gate: RateGate,
}

impl<S, B> Service<ServiceRequest> for RateGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.gate.allow() {
            debug!(path = %req.path(), "Rate limit exceeded");
            RATE_LIMIT_REJECTIONS_TOTAL.inc();

            let response = AppError::RateLimited.error_response();
            return Box::pin(async move { Ok(req.into_response(response)) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_boxed_body())
        })
    }
}
