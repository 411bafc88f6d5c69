use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use super::ApiState;
use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    sessions: String,
}

const fn status_str(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Credential and session stores are reachable", body = [Health]),
        (status = 503, description = "A store is unreachable", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(method: Method, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let stores = state.auth.health().await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_str(stores.credentials).to_string(),
        sessions: status_str(stores.sessions).to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        })
        .unwrap_or_else(|()| HeaderMap::new());

    if stores.is_healthy() {
        (StatusCode::OK, headers, body)
    } else {
        debug!(
            database = stores.credentials,
            sessions = stores.sessions,
            "store health check failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
