/// JWT Authentication Middleware
///
/// Guards protected routes: extracts the bearer token, runs the full
/// validity check (revocation first, then signature, expiry, and the
/// user-wide cutoff), and injects the resulting identity into request
/// extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{AppError, AuthError};
use crate::service::AuthService;

pub struct JwtMiddleware {
    auth: Arc<AuthService>,
}

impl JwtMiddleware {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    auth: Arc<AuthService>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = match token {
            Some(token) => token,
            None => {
                tracing::warn!("Missing or invalid Authorization header");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Missing or invalid authorization header",
                    "code": "UNAUTHORIZED"
                }));
                return Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Unauthorized",
                        response,
                    )
                    .into())
                });
            }
        };

        match self.auth.validate_token(&token) {
            Ok(validation) if validation.token_type == "ACCESS" => {
                tracing::debug!(
                    user_id = %validation.user_id,
                    email = %validation.email,
                    "JWT validated successfully"
                );
                req.extensions_mut().insert(validation);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Ok(_) => {
                tracing::warn!("Refresh token presented on a protected route");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Invalid or expired token",
                    "code": "TOKEN_INVALID"
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Invalid token",
                        response,
                    )
                    .into())
                })
            }
            Err(e) => {
                let code = match &e {
                    AppError::Auth(AuthError::TokenRevoked) => "TOKEN_REVOKED",
                    _ => "TOKEN_INVALID",
                };
                tracing::warn!(error = %e, "JWT validation failed");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Invalid or expired token",
                    "code": code
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Invalid token",
                        response,
                    )
                    .into())
                })
            }
        }
    }
}
