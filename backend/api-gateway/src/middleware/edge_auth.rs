//! Edge authentication
//!
//! Turns a valid `AccessToken` cookie into the `AccountId`/`Role` headers the
//! services trust. Client-supplied copies of those headers never get through.
//! Requests without the cookie are forwarded anonymous and each service
//! decides whether that is acceptable. Websocket traffic passes untouched:
//! the chat socket authenticates its own handshake.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue, UPGRADE},
    Error, ResponseError,
};
use actix_middleware::{ACCOUNT_ID_HEADER, ROLE_HEADER};
use crypto_core::{Principal, TokenKind, TokenService, ACCESS_TOKEN_COOKIE};
use error_types::ServiceError;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

const CHAT_SOCKET_PATH: &str = "/message/ws";

pub fn is_websocket_request(path: &str, headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.eq_ignore_ascii_case("websocket"));
    upgrade || path.contains(CHAT_SOCKET_PATH)
}

fn install_identity(headers: &mut HeaderMap, principal: &Principal) {
    let pairs = [
        (ACCOUNT_ID_HEADER, principal.account_id.to_string()),
        (ROLE_HEADER, principal.role.as_str().to_string()),
    ];
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            headers.insert(name, value);
        }
    }
}

/// Outermost middleware of the gateway.
#[derive(Clone)]
pub struct EdgeAuth {
    tokens: Arc<TokenService>,
}

impl EdgeAuth {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for EdgeAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = EdgeAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(EdgeAuthService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct EdgeAuthService<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for EdgeAuthService<S>
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
        let service = self.service.clone();

        if is_websocket_request(req.path(), req.headers()) {
            return Box::pin(async move { service.call(req).await.map(ServiceResponse::map_into_left_body) });
        }

        let headers = req.headers_mut();
        headers.remove(ACCOUNT_ID_HEADER);
        headers.remove(ROLE_HEADER);

        let token = req
            .cookie(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());

        if let Some(token) = token {
            match self.tokens.validate(&token, TokenKind::Access) {
                Ok(principal) => install_identity(req.headers_mut(), &principal),
                Err(e) => {
                    tracing::warn!(
                        path = %req.path(),
                        error = %e,
                        "Access token rejected at the edge"
                    );
                    let response = ServiceError::Token(e).error_response();
                    return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
                }
            }
        }

        Box::pin(async move { service.call(req).await.map(ServiceResponse::map_into_left_body) })
    }
}
