use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::HeaderMap,
    Error, HttpMessage,
};
use crypto_core::{Principal, Role};
use error_types::ServiceError;
use futures::future::{ready, LocalBoxFuture, Ready};
use uuid::Uuid;

/// Set by the gateway after it validated the access token.
pub const ACCOUNT_ID_HEADER: &str = "AccountId";
pub const ROLE_HEADER: &str = "Role";

/// Principal installed by [`IdentityHeaders`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Principal);

impl AuthenticatedUser {
    pub fn account_id(&self) -> Uuid {
        self.0.account_id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }
}

/// Reads the identity headers without verifying anything.
pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let account_id = headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())?;

    let role = headers
        .get(ROLE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<Role>().ok())?;

    Some(Principal::new(account_id, role))
}

/// Trusts `AccountId`/`Role` headers from the gateway and installs the
/// principal. Requests without them pass through anonymous.
#[derive(Clone, Copy, Default)]
pub struct IdentityHeaders;

impl<S, B> Transform<S, ServiceRequest> for IdentityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = IdentityHeadersService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityHeadersService { service }))
    }
}

pub struct IdentityHeadersService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for IdentityHeadersService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(principal) = principal_from_headers(req.headers()) {
            tracing::trace!(account_id = %principal.account_id, "identity headers accepted");
            req.extensions_mut().insert(AuthenticatedUser(principal));
        }

        Box::pin(self.service.call(req))
    }
}

impl actix_web::FromRequest for AuthenticatedUser {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(*user)),
            None => ready(Err(ServiceError::Unauthenticated)),
        }
    }
}
