/// Bearer token authentication for account routes.
/// Resolved claims are stored in request extensions for the handlers.
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::AppError;
use crate::security::{Claims, TokenError, TokenService};

/// Claims of the caller, available to handlers behind [`JwtAuth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Claims);

#[derive(Clone)]
pub struct JwtAuth {
    tokens: Arc<TokenService>,
}

impl JwtAuth {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtAuthService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtAuthService<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthService<S>
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
        let service = self.service.clone();
        let tokens = self.tokens.clone();

        Box::pin(async move {
            // Owned copy so no header borrow is alive at extensions_mut()
            let credential = req
                .headers()
                .get(AUTHORIZATION)
                .map(|value| value.to_str().map(str::to_string));

            let claims = match credential {
                Some(Ok(credential)) => tokens.authenticate(&credential).await,
                Some(Err(_)) => Err(TokenError::Malformed),
                None => Err(TokenError::Missing),
            };

            match claims {
                Ok(claims) => {
                    req.extensions_mut().insert(AuthenticatedAccount(claims));
                    let res = service.call(req).await?;
                    Ok(res.map_into_boxed_body())
                }
                Err(e) => {
                    let response = AppError::from(e).error_response();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

impl FromRequest for AuthenticatedAccount {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedAccount>().cloned() {
            Some(account) => ready(Ok(account)),
            None => ready(Err(AppError::Unauthenticated(
                "Missing authentication".to_string(),
            ))),
        }
    }
}
