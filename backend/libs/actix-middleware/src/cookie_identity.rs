//! Identity for services that clients can reach without the gateway.
//!
//! [`CookieIdentity`] never trusts `AccountId`/`Role` request headers: it
//! drops them and installs the principal from a valid `AccessToken` cookie
//! instead. A missing cookie leaves the request anonymous; an invalid one is
//! answered with 401 before the handler runs.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use crypto_core::{TokenKind, TokenService, ACCESS_TOKEN_COOKIE};
use error_types::ServiceError;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::identity::{AuthenticatedUser, ACCOUNT_ID_HEADER, ROLE_HEADER};

#[derive(Clone)]
pub struct CookieIdentity {
    tokens: Arc<TokenService>,
}

impl CookieIdentity {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CookieIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CookieIdentityService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CookieIdentityService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct CookieIdentityService<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for CookieIdentityService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let headers = req.headers_mut();
        headers.remove(ACCOUNT_ID_HEADER);
        headers.remove(ROLE_HEADER);

        let token = req
            .cookie(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());

        if let Some(token) = token {
            match self.tokens.validate(&token, TokenKind::Access) {
                Ok(principal) => {
                    req.extensions_mut().insert(AuthenticatedUser(principal));
                }
                Err(e) => {
                    tracing::warn!(path = %req.path(), error = %e, "Access cookie rejected");
                    let response = ServiceError::Token(e).error_response();
                    return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
                }
            }
        }

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await.map(ServiceResponse::map_into_left_body) })
    }
}
