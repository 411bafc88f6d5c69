//! Password registration, login, refresh rotation and logout.

use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;
use utoipa::ToSchema;

use super::{ApiError, ApiState, Envelope, ErrorBody, enforce_rate_limit};
use crate::auth::models::AuthResponse;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn missing_payload() -> ApiError {
    ApiError::bad_request("missing payload")
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Malformed email, username or password", body = ErrorBody),
        (status = 409, description = "Email or username already taken", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    let response = state
        .auth
        .register(&request.email, &request.username, &request.password)
        .await?;
    Ok((StatusCode::CREATED, limits, Json(Envelope::ok(response))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    let response = state.auth.login(&request.email, &request.password).await?;
    Ok((limits, Json(Envelope::ok(response))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh token rotated", body = AuthResponse),
        (status = 401, description = "Unknown, replayed or expired refresh token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    let response = state.auth.refresh(&request.refresh_token).await?;
    Ok((limits, Json(Envelope::ok(response))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh token revoked (unknown tokens included)"),
        (status = 400, description = "Missing payload", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    uri: Uri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let limits = enforce_rate_limit(&state, peer, &headers, uri.path()).await?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    state.auth.logout(&request.refresh_token).await?;
    Ok((limits, Json(Envelope::empty())))
}
