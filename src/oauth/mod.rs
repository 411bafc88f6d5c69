//! External identity providers.
//!
//! The reconciler only sees the [`OAuthProvider`] capability; GitHub and
//! Google implement it over `oauth2` + `reqwest`, tests swap in fakes.

pub mod github;
pub mod google;

use async_trait::async_trait;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl,
    basic::BasicClient,
};
use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, sync::Arc};

use crate::auth::{
    error::{Error, Result},
    models::{ExternalIdentity, Provider},
};

pub use self::github::GitHubProvider;
pub use self::google::GoogleProvider;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Consent URL the browser is redirected to, carrying `state` verbatim.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<SecretString>;

    /// Resolve the verified profile behind a provider access token.
    async fn fetch_profile(&self, access_token: &SecretString) -> Result<ExternalIdentity>;
}

/// Client credentials shared by every provider.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Callback base; each provider appends `/<provider>/callback`.
    pub callback_base: String,
}

impl OAuthClientConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString, callback_base: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_base,
        }
    }

    #[must_use]
    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}/{}/callback",
            self.callback_base.trim_end_matches('/'),
            provider
        )
    }
}

/// `oauth2` client with the authorization and token endpoints set.
pub(crate) type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub(crate) fn build_client(
    config: &OAuthClientConfig,
    provider: Provider,
    auth_url: &str,
    token_url: &str,
) -> Result<ConfiguredClient> {
    let invalid = |err: url::ParseError| Error::OAuthExchange(format!("invalid {provider} url: {err}"));
    Ok(BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(
            config.client_secret.expose_secret().to_string(),
        ))
        .set_auth_uri(AuthUrl::new(auth_url.to_string()).map_err(invalid)?)
        .set_token_uri(TokenUrl::new(token_url.to_string()).map_err(invalid)?)
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri(provider)).map_err(invalid)?))
}

/// HTTP client for token exchange and profile calls. Redirects are never
/// followed during the exchange.
pub(crate) fn build_http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .map_err(|err| Error::OAuthExchange(format!("failed to build http client: {err}")))
}

/// Configured providers, keyed by [`Provider`].
#[derive(Clone, Default)]
pub struct OAuthProviders {
    providers: HashMap<Provider, Arc<dyn OAuthProvider>>,
}

impl OAuthProviders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&provider).cloned()
    }

    /// # Errors
    /// Returns [`Error::OAuthExchange`] when `provider` has no credentials configured.
    pub fn require(&self, provider: Provider) -> Result<Arc<dyn OAuthProvider>> {
        self.get(provider)
            .ok_or_else(|| Error::OAuthExchange(format!("{provider} login is not configured")))
    }

    #[must_use]
    pub fn configured(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| self.providers.contains_key(provider))
            .collect()
    }
}

impl std::fmt::Debug for OAuthProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviders")
            .field("configured", &self.configured())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> OAuthClientConfig {
        OAuthClientConfig::new(
            "client".to_string(),
            SecretString::from("secret"),
            "http://localhost:8080/api/v1/auth/oauth/".to_string(),
        )
    }

    #[test]
    fn redirect_uri_appends_provider_callback() {
        assert_eq!(
            config().redirect_uri(Provider::Github),
            "http://localhost:8080/api/v1/auth/oauth/github/callback"
        );
    }

    #[test]
    fn registry_reports_configured_providers() {
        let github = GitHubProvider::new(&config()).unwrap();
        let registry = OAuthProviders::new().with(Arc::new(github));
        assert_eq!(registry.configured(), vec![Provider::Github]);
        assert!(registry.get(Provider::Github).is_some());
        assert!(matches!(
            registry.require(Provider::Google),
            Err(Error::OAuthExchange(_))
        ));
    }
}
