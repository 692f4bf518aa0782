//! Path-prefix reverse proxy
//!
//! Requests are replayed against the upstream chosen by their first path
//! segment. Websocket upgrades cannot be tunnelled through a buffered HTTP
//! client, so they are redirected to the chat service instead.

use actix_web::{
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse, ResponseError,
};
use error_types::HttpErrorResponse;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Upstreams;
use crate::middleware::is_websocket_request;

/// Connection-scoped headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no upstream serves {0}")]
    UnknownRoute(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownRoute(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (code, message) = match self {
            Self::UnknownRoute(_) => ("NOT_FOUND", "Route not found"),
            Self::Upstream(_) => ("BAD_GATEWAY", "Upstream service unavailable"),
        };
        let status = self.status_code();
        HttpResponse::build(status).json(HttpErrorResponse::new(status.as_u16(), code, message))
    }
}

pub struct ProxyState {
    pub upstreams: Upstreams,
    pub chat_ws_url: String,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(upstreams: Upstreams, chat_ws_url: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            upstreams,
            chat_ws_url,
            client,
        })
    }
}

fn path_and_query(req: &HttpRequest) -> String {
    match req.uri().query() {
        Some(query) => format!("{}?{}", req.path(), query),
        None => req.path().to_string(),
    }
}

/// Default service of the gateway app.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse, GatewayError> {
    let target_path = path_and_query(&req);

    if is_websocket_request(req.path(), req.headers()) {
        let location = format!("{}{}", state.chat_ws_url, target_path);
        debug!(%location, "Redirecting websocket upgrade to chat service");
        return Ok(HttpResponse::TemporaryRedirect()
            .insert_header((header::LOCATION, location))
            .finish());
    }

    let upstream = state
        .upstreams
        .resolve(req.path())
        .ok_or_else(|| GatewayError::UnknownRoute(req.path().to_string()))?;
    let url = format!("{upstream}{target_path}");

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| GatewayError::Upstream(format!("unsupported method: {e}")))?;
    let mut outgoing = state.client.request(method, &url);
    for (name, value) in req.headers() {
        if is_hop_by_hop(name.as_str()) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        outgoing = outgoing.header(name.as_str(), value.as_bytes());
    }
    if let Some(peer) = req.connection_info().realip_remote_addr() {
        outgoing = outgoing.header("x-forwarded-for", peer);
    }

    let upstream_response = outgoing.body(body.to_vec()).send().await.map_err(|e| {
        warn!(%url, error = %e, "Upstream request failed");
        GatewayError::Upstream(e.to_string())
    })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .map_err(|e| GatewayError::Upstream(format!("invalid upstream status: {e}")))?;
    let mut response = HttpResponse::build(status);
    for (name, value) in upstream_response.headers() {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        response.append_header((name.as_str(), value.as_bytes()));
    }

    let bytes = upstream_response
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {e}")))?;
    Ok(response.body(bytes.to_vec()))
}
