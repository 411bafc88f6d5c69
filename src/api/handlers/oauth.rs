//! Browser-facing OAuth redirects.
//!
//! `GET /api/v1/auth/oauth/{provider}` sends the browser to the provider's
//! consent page; the provider comes back to `.../callback` with a code, which
//! is exchanged and reconciled before the browser is redirected to the
//! frontend dashboard with the token pair in the query string.

use axum::{
    extract::{ConnectInfo, Extension, Path, Query},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use url::Url;
use utoipa::IntoParams;
use uuid::Uuid;

use super::{ApiError, ApiState, ErrorBody, enforce_rate_limit};
use crate::auth::models::{Provider, TokenPair};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// Opaque value echoed back by the provider. A random UUID when omitted.
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse::<Provider>()
        .map_err(|_| ApiError::bad_request("unsupported provider"))
}

/// `<frontend>/dashboard?access_token=..&refresh_token=..&expires_in=..`
pub(crate) fn dashboard_redirect(frontend: &Url, tokens: &TokenPair) -> String {
    let mut url = frontend.clone();
    let path = format!("{}/dashboard", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("access_token", &tokens.access_token)
        .append_pair("refresh_token", &tokens.refresh_token)
        .append_pair("expires_in", &tokens.expires_in.to_string());
    url.into()
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}",
    params(
        ("provider" = String, Path, description = "github or google"),
        AuthorizeQuery
    ),
    responses(
        (status = 307, description = "Redirect to the provider consent page"),
        (status = 400, description = "Unsupported provider", body = ErrorBody),
        (status = 502, description = "Provider not configured", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(uri, peer, headers, query, state))]
pub async fn authorize(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
    state: Extension<Arc<ApiState>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let provider = parse_provider(&provider)?;
    let csrf_state = query
        .state
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let url = state.auth.authorization_url(provider, &csrf_state)?;
    debug!(%provider, "redirecting to provider consent page");
    Ok((limits, Redirect::temporary(&url)))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "github or google"),
        CallbackQuery
    ),
    responses(
        (status = 307, description = "Redirect to the frontend dashboard with tokens"),
        (status = 400, description = "Missing code or unsupported provider", body = ErrorBody),
        (status = 409, description = "Email already belongs to another account", body = ErrorBody),
        (status = 502, description = "Provider exchange failed", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(uri, peer, headers, query, state))]
pub async fn callback(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    state: Extension<Arc<ApiState>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let provider = parse_provider(&provider)?;
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return Err(ApiError::bad_request("missing authorization code"));
    };

    let response = state.auth.oauth_callback(provider, &code).await?;
    let location = dashboard_redirect(&state.frontend_base_url, &response.tokens);
    Ok((limits, Redirect::temporary(&location)))
}
