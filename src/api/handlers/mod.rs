//! HTTP handlers and the response conventions they share.
//!
//! Successful bodies are wrapped as `{"success": true, "data": ...}`; failures
//! carry `{"success": false, "error": "..."}` with a status derived from the
//! lifecycle [`Error`].

pub mod auth;
pub mod health;
pub mod me;
pub mod oauth;

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, error};
use url::Url;
use utoipa::ToSchema;

use crate::auth::{
    AuthService, Error, RateLimitIdentity, RateLimitStatus, rate_limit_key,
    utils::extract_client_ip,
};

/// Everything a handler needs, shared behind an `Arc` extension.
pub struct ApiState {
    pub auth: AuthService,
    /// Where OAuth callbacks send the browser once tokens are issued.
    pub frontend_base_url: Url,
    /// Rate-limit on proxy headers rather than the socket peer.
    pub trust_proxy_headers: bool,
}

impl ApiState {
    #[must_use]
    pub const fn new(auth: AuthService, frontend_base_url: Url) -> Self {
        Self {
            auth,
            frontend_base_url,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_trusted_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            success: true,
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

/// Lifecycle error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub(crate) fn bad_request(message: &str) -> Self {
        Self(Error::Validation(message.to_string()))
    }
}

#[must_use]
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidCredentials | Error::InvalidToken | Error::ExpiredToken => {
            StatusCode::UNAUTHORIZED
        }
        Error::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        Error::DuplicateAccount(_) => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::OAuthExchange(_) => StatusCode::BAD_GATEWAY,
        Error::AccountNotFound => StatusCode::NOT_FOUND,
        Error::Hashing(_) | Error::Issuance(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status.is_server_error() {
            error!("request failed: {}", self.0);
            match self.0 {
                Error::OAuthExchange(_) => "OAuth provider exchange failed".to_string(),
                Error::Store(_) => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            debug!("request rejected: {}", self.0);
            self.0.to_string()
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

/// The socket peer, unless a trusted proxy in front reports the original client.
fn client_address(trust_proxy_headers: bool, peer: SocketAddr, headers: &HeaderMap) -> String {
    trust_proxy_headers
        .then(|| extract_client_ip(headers))
        .flatten()
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Count this request against `path` for the caller's address and return the
/// `X-RateLimit-*` headers for the response.
pub(crate) async fn enforce_rate_limit(
    state: &ApiState,
    peer: SocketAddr,
    headers: &HeaderMap,
    path: &str,
) -> Result<HeaderMap, ApiError> {
    let address = client_address(state.trust_proxy_headers, peer, headers);
    let identity = RateLimitIdentity::resolve(None, Some(address));
    let status = state
        .auth
        .check_rate_limit(&rate_limit_key(path, &identity))
        .await?;
    Ok(rate_limit_headers(status))
}

fn rate_limit_headers(status: RateLimitStatus) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
    headers
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
