//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, connect_info::MockConnectInfo},
    http::{Request, Response, StatusCode, header::AUTHORIZATION},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceExt;
use url::Url;

use super::{ApiState, app};
use crate::{
    auth::{
        AuthConfig, AuthService, Error,
        models::{ExternalIdentity, Provider},
    },
    oauth::{OAuthProvider, OAuthProviders},
    store::{MemoryCounterStore, MemoryCredentialStore, MemorySessionStore},
};

struct StaticProvider;

#[async_trait]
impl OAuthProvider for StaticProvider {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://github.test/login/oauth/authorize?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> crate::auth::Result<SecretString> {
        if code == "denied" {
            return Err(Error::OAuthExchange("bad_verification_code".to_string()));
        }
        Ok(SecretString::from("gho_token"))
    }

    async fn fetch_profile(
        &self,
        _access_token: &SecretString,
    ) -> crate::auth::Result<ExternalIdentity> {
        Ok(ExternalIdentity {
            provider: Provider::Github,
            provider_user_id: "583231".to_string(),
            email: "octocat@github.test".to_string(),
            display_name: Some("The Octocat".to_string()),
            preferred_username: Some("octocat".to_string()),
            avatar_url: None,
        })
    }
}

const DEFAULT_PEER: ([u8; 4], u16) = ([198, 51, 100, 1], 40_000);

fn test_app(rate_limit_max: u64) -> Result<Router> {
    test_app_with(rate_limit_max, false)
}

/// Requests without their own `ConnectInfo` come from `DEFAULT_PEER`.
fn test_app_with(rate_limit_max: u64, trust_proxy_headers: bool) -> Result<Router> {
    let config = AuthConfig::new(SecretString::from("router-test-secret"))
        .with_password_work_factor(1)
        .with_rate_limit(rate_limit_max, Duration::from_secs(60));
    let service = AuthService::new(
        config,
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryCounterStore::new()),
        OAuthProviders::new().with(Arc::new(StaticProvider)),
    )?;
    let frontend = Url::parse("https://app.tessera.test")?;
    let state =
        ApiState::new(service, frontend).with_trusted_proxy_headers(trust_proxy_headers);
    Ok(app(Arc::new(state))?.layer(MockConnectInfo(SocketAddr::from(DEFAULT_PEER))))
}

fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 50_000))));
    request
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

async fn json_body(response: Response<Body>) -> Result<Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn location(response: &Response<Body>) -> Result<Url> {
    let header = response
        .headers()
        .get("location")
        .ok_or_else(|| anyhow!("missing location header"))?;
    Ok(Url::parse(header.to_str()?)?)
}

#[tokio::test]
async fn register_then_me_round_trip() -> Result<()> {
    let app = test_app(100)?;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/auth/register",
            &json!({"email": "a@x.com", "username": "alice", "password": "longenough1"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response
            .headers()
            .get("X-RateLimit-Limit")
            .and_then(|value| value.to_str().ok()),
        Some("100")
    );
    let body = json_body(response).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["expires_in"], 900);
    let access_token = body["data"]["access_token"]
        .as_str()
        .ok_or_else(|| anyhow!("no access token"))?
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/user/me")
                .header(AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["email"], "a@x.com");
    Ok(())
}

#[tokio::test]
async fn me_without_token_is_unauthorized() -> Result<()> {
    let response = test_app(100)?
        .oneshot(Request::builder().uri("/api/v1/user/me").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid token");
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_duplicate_statuses() -> Result<()> {
    let app = test_app(100)?;
    let register = json!({"email": "a@x.com", "username": "alice", "password": "longenough1"});
    app.clone()
        .oneshot(post_json("/api/v1/auth/register", &register)?)
        .await?;

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/auth/register", &register)?)
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/auth/login",
            &json!({"email": "a@x.com", "password": "not-the-one"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"], "invalid credentials");

    let response = app
        .oneshot(post_json(
            "/api/v1/auth/register",
            &json!({"email": "nope", "username": "bob", "password": "longenough1"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_logout_is_idempotent() -> Result<()> {
    let app = test_app(100)?;
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/auth/register",
            &json!({"email": "a@x.com", "username": "alice", "password": "longenough1"}),
        )?)
        .await?;
    let refresh_token = json_body(response).await?["data"]["refresh_token"]
        .as_str()
        .ok_or_else(|| anyhow!("no refresh token"))?
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/auth/refresh",
            &json!({"refresh_token": refresh_token}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = json_body(response).await?["data"]["refresh_token"]
        .as_str()
        .ok_or_else(|| anyhow!("no rotated token"))?
        .to_string();
    assert_ne!(rotated, refresh_token);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/auth/refresh",
            &json!({"refresh_token": refresh_token}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/auth/logout",
                &json!({"refresh_token": rotated}),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!({"success": true}));
    }
    Ok(())
}

#[tokio::test]
async fn sixth_login_attempt_is_rate_limited() -> Result<()> {
    let app = test_app(5)?;
    let attempt = json!({"email": "ghost@x.com", "password": "whatever1"});
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/login", &attempt)?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/auth/login", &attempt)?)
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another route has its own window.
    let response = app
        .oneshot(post_json(
            "/api/v1/auth/refresh",
            &json!({"refresh_token": "nope"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn rate_limit_windows_follow_the_peer_address() -> Result<()> {
    let app = test_app(5)?;
    let attempt = json!({"email": "ghost@x.com", "password": "whatever1"});
    let login = |peer: [u8; 4]| -> Result<Request<Body>> {
        Ok(from_peer(post_json("/api/v1/auth/login", &attempt)?, peer))
    };

    for _ in 0..5 {
        let response = app.clone().oneshot(login([192, 0, 2, 10])?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login([192, 0, 2, 10])?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client keeps its own budget.
    let response = app.clone().oneshot(login([192, 0, 2, 20])?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Forwarding headers are ignored when no trusted proxy is configured.
    for i in 0..20 {
        let mut request = login([192, 0, 2, 10])?;
        request
            .headers_mut()
            .insert("x-forwarded-for", format!("10.0.0.{i}").parse()?);
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(())
}

#[tokio::test]
async fn trusted_proxy_headers_identify_the_client() -> Result<()> {
    let app = test_app_with(5, true)?;
    let attempt = json!({"email": "ghost@x.com", "password": "whatever1"});
    let login = |client: &str| -> Result<Request<Body>> {
        let mut request = post_json("/api/v1/auth/login", &attempt)?;
        request
            .headers_mut()
            .insert("x-forwarded-for", client.parse()?);
        Ok(request)
    };

    for _ in 0..5 {
        let response = app.clone().oneshot(login("203.0.113.7")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login("203.0.113.7")?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.clone().oneshot(login("203.0.113.8")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn oauth_redirects_to_provider_then_dashboard() -> Result<()> {
    let app = test_app(100)?;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/github?state=xyz")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response)?.as_str(),
        "https://github.test/login/oauth/authorize?state=xyz"
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/github/callback?code=abc&state=xyz")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let target = location(&response)?;
    assert_eq!(target.path(), "/dashboard");
    let params: Vec<(String, String)> = target.query_pairs().into_owned().collect();
    let names: Vec<&str> = params.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["access_token", "refresh_token", "expires_in"]);
    assert_eq!(params[2].1, "900");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/github/callback?code=denied")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/github/callback")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/gitlab")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn oauth_start_generates_state_when_missing() -> Result<()> {
    let response = test_app(100)?
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/oauth/github")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let state = location(&response)?
        .query_pairs()
        .find(|(name, _)| name == "state")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("no state"))?;
    assert!(uuid::Uuid::parse_str(&state).is_ok());
    Ok(())
}

#[tokio::test]
async fn health_reports_stores_and_app_header() -> Result<()> {
    let response = test_app(100)?
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let x_app = response
        .headers()
        .get("X-App")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| anyhow!("missing X-App"))?
        .to_string();
    assert!(x_app.starts_with(concat!(env!("CARGO_PKG_NAME"), ":", env!("CARGO_PKG_VERSION"))));
    let body = json_body(response).await?;
    assert_eq!(body["database"], "ok");
    assert_eq!(body["sessions"], "ok");
    Ok(())
}

#[test]
fn frontend_origin_strips_path() -> Result<()> {
    let origin = super::frontend_origin(&Url::parse("http://localhost:3000/app/")?)?;
    assert_eq!(origin, "http://localhost:3000");
    Ok(())
}
