use crate::{
    api::{self, ApiState},
    auth::{AuthConfig, AuthService},
    cli::commands::oauth::ClientCredentials,
    oauth::{GitHubProvider, GoogleProvider, OAuthClientConfig, OAuthProviders},
    store::{PgCredentialStore, RedisCounterStore, RedisSessionStore, redis},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub frontend_base_url: String,
    pub jwt_secret: SecretString,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub password_work_factor: u32,
    pub store_timeout_seconds: u64,
    pub rate_limit_max: u64,
    pub rate_limit_window_seconds: u64,
    pub trust_proxy_headers: bool,
    pub oauth_callback_url: String,
    pub github: Option<ClientCredentials>,
    pub google: Option<ClientCredentials>,
}

fn client_config(credentials: ClientCredentials, callback_base: &str) -> OAuthClientConfig {
    OAuthClientConfig::new(
        credentials.client_id,
        credentials.client_secret,
        callback_base.to_string(),
    )
}

fn oauth_providers(args: &mut Args) -> Result<OAuthProviders> {
    let mut providers = OAuthProviders::new();
    if let Some(credentials) = args.github.take() {
        let config = client_config(credentials, &args.oauth_callback_url);
        providers = providers.with(Arc::new(
            GitHubProvider::new(&config).context("Invalid GitHub OAuth configuration")?,
        ));
    }
    if let Some(credentials) = args.google.take() {
        let config = client_config(credentials, &args.oauth_callback_url);
        providers = providers.with(Arc::new(
            GoogleProvider::new(&config).context("Invalid Google OAuth configuration")?,
        ));
    }
    if providers.configured().is_empty() {
        warn!("no OAuth providers configured, only password sign-in is available");
    }
    Ok(providers)
}

/// Execute the server action.
/// # Errors
/// Returns an error if a store cannot be reached, the configuration is invalid, or the server fails.
pub async fn execute(mut args: Args) -> Result<()> {
    let frontend_base_url = Url::parse(&args.frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {}", args.frontend_base_url))?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let conn = redis::connect(&args.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let oauth = oauth_providers(&mut args)?;
    info!(providers = ?oauth.configured(), "OAuth providers");

    let config = AuthConfig::new(args.jwt_secret)
        .with_access_token_minutes(args.access_token_minutes)
        .with_refresh_token_days(args.refresh_token_days)
        .with_password_work_factor(args.password_work_factor)
        .with_store_timeout(Duration::from_secs(args.store_timeout_seconds))
        .with_rate_limit(
            args.rate_limit_max,
            Duration::from_secs(args.rate_limit_window_seconds),
        );

    let service = AuthService::new(
        config,
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(RedisSessionStore::new(conn.clone())),
        Arc::new(RedisCounterStore::new(conn)),
        oauth,
    )
    .context("Failed to build auth service")?;

    if args.trust_proxy_headers {
        info!("rate limits keyed on proxy-supplied client addresses");
    }
    let state = ApiState::new(service, frontend_base_url)
        .with_trusted_proxy_headers(args.trust_proxy_headers);

    api::new(args.port, Arc::new(state)).await
}
