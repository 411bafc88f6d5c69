use axum::{
    Json,
    extract::Extension,
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

use super::{ApiError, ApiState, Envelope, ErrorBody, extract_bearer_token};
use crate::auth::{Error, models::AccountView};

#[utoipa::path(
    get,
    path = "/api/v1/user/me",
    responses(
        (status = 200, description = "Profile of the access token's account", body = AccountView),
        (status = 401, description = "Missing, invalid or expired access token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn me(
    headers: HeaderMap,
    state: Extension<Arc<ApiState>>,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_bearer_token(&headers).ok_or(ApiError(Error::InvalidToken))?;
    let claims = state.auth.validate_access_token(&token)?;
    let account = state.auth.get_account(claims.user_id).await?;
    Ok(Json(Envelope::ok(account)))
}
