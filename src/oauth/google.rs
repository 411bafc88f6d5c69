//! Google OAuth: `email profile` scopes, profile from the v2 userinfo endpoint.

use async_trait::async_trait;
use oauth2::{AuthorizationCode, CsrfToken, Scope, TokenResponse};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{ConfiguredClient, OAuthClientConfig, OAuthProvider, build_client, build_http_client};
use crate::auth::{
    error::{Error, Result},
    models::{ExternalIdentity, Provider},
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    #[serde(default)]
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

impl TryFrom<GoogleUser> for ExternalIdentity {
    type Error = Error;

    fn try_from(user: GoogleUser) -> Result<Self> {
        if user.email.trim().is_empty() {
            return Err(Error::OAuthExchange(
                "google account has no email address".to_string(),
            ));
        }
        Ok(Self {
            provider: Provider::Google,
            provider_user_id: user.id,
            email: user.email,
            display_name: user.name,
            preferred_username: None,
            avatar_url: user.picture,
        })
    }
}

pub struct GoogleProvider {
    client: ConfiguredClient,
    http: reqwest::Client,
}

impl GoogleProvider {
    /// # Errors
    /// Returns [`Error::OAuthExchange`] if the callback URL is invalid.
    pub fn new(config: &OAuthClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, Provider::Google, AUTH_URL, TOKEN_URL)?,
            http: build_http_client()?,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorization_url(&self, state: &str) -> String {
        let state = state.to_string();
        let (url, _) = self
            .client
            .authorize_url(|| CsrfToken::new(state))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|err| Error::OAuthExchange(format!("google token exchange failed: {err}")))?;
        Ok(SecretString::from(token.access_token().secret().clone()))
    }

    async fn fetch_profile(&self, access_token: &SecretString) -> Result<ExternalIdentity> {
        let user: GoogleUser = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::OAuthExchange(format!("google request failed: {err}")))?
            .json()
            .await
            .map_err(|err| Error::OAuthExchange(format!("google response malformed: {err}")))?;
        ExternalIdentity::try_from(user)
    }
}
