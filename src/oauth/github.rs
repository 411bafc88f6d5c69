//! GitHub OAuth: `user:email` scope, profile from `/user`, falling back to
//! `/user/emails` when the public email is hidden.

use async_trait::async_trait;
use oauth2::{AuthorizationCode, CsrfToken, Scope, TokenResponse};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{ConfiguredClient, OAuthClientConfig, OAuthProvider, build_client, build_http_client};
use crate::auth::{
    error::{Error, Result},
    models::{ExternalIdentity, Provider},
};

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubProvider {
    client: ConfiguredClient,
    http: reqwest::Client,
}

impl GitHubProvider {
    /// # Errors
    /// Returns [`Error::OAuthExchange`] if the callback URL is invalid.
    pub fn new(config: &OAuthClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config, Provider::Github, AUTH_URL, TOKEN_URL)?,
            http: build_http_client()?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &SecretString,
    ) -> Result<T> {
        self.http
            .get(url)
            .bearer_auth(access_token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::OAuthExchange(format!("github request failed: {err}")))?
            .json::<T>()
            .await
            .map_err(|err| Error::OAuthExchange(format!("github response malformed: {err}")))
    }
}

/// Primary verified address first, then any address at all.
fn pick_email(emails: Vec<GitHubEmail>) -> Option<String> {
    let mut first = None;
    for entry in emails {
        if entry.primary && entry.verified {
            return Some(entry.email);
        }
        if first.is_none() {
            first = Some(entry.email);
        }
    }
    first
}

fn identity(user: GitHubUser, email: String) -> Result<ExternalIdentity> {
    if email.trim().is_empty() {
        return Err(Error::OAuthExchange(
            "github account has no email address".to_string(),
        ));
    }
    Ok(ExternalIdentity {
        provider: Provider::Github,
        provider_user_id: user.id.to_string(),
        email,
        display_name: user.name,
        preferred_username: Some(user.login),
        avatar_url: user.avatar_url,
    })
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn authorization_url(&self, state: &str) -> String {
        let state = state.to_string();
        let (url, _) = self
            .client
            .authorize_url(|| CsrfToken::new(state))
            .add_scope(Scope::new("user:email".to_string()))
            .url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|err| Error::OAuthExchange(format!("github token exchange failed: {err}")))?;
        Ok(SecretString::from(token.access_token().secret().clone()))
    }

    async fn fetch_profile(&self, access_token: &SecretString) -> Result<ExternalIdentity> {
        let user: GitHubUser = self.get_json(USER_URL, access_token).await?;
        let email = match user.email.clone().filter(|email| !email.trim().is_empty()) {
            Some(email) => email,
            None => {
                debug!(github_id = user.id, "public email hidden, listing addresses");
                let emails: Vec<GitHubEmail> = self.get_json(EMAILS_URL, access_token).await?;
                pick_email(emails).unwrap_or_default()
            }
        };
        identity(user, email)
    }
}
