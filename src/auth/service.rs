//! Caller-facing lifecycle operations.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::{Error, Result},
    models::{
        Account, AccountView, AuthResponse, Claims, NewAccount, Provider, RefreshTokenRecord,
        TokenPair,
    },
    password::PasswordHasher,
    rate_limit::{RateLimitStatus, RateLimiter},
    reconcile::Reconciler,
    refresh::RefreshTokens,
    token::TokenIssuer,
    utils::{normalize_email, validate_registration},
};
use crate::{
    oauth::OAuthProviders,
    store::{CounterStore, CredentialStore, SessionTokenStore, StoreError, UniqueField, bounded},
};

/// Mint a token pair for an account and persist its refresh record.
///
/// Password login and the OAuth reconciler both end here.
#[async_trait]
pub trait TokenIssuance: Send + Sync {
    async fn issue_and_store_tokens(&self, account: &Account) -> Result<TokenPair>;
}

/// Reachability of the two persistence tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreHealth {
    pub credentials: bool,
    pub sessions: bool,
}

impl StoreHealth {
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        self.credentials && self.sessions
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionTokenStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokens,
    reconciler: Reconciler,
    rate_limiter: RateLimiter,
    oauth: OAuthProviders,
}

impl AuthService {
    /// # Errors
    /// Returns [`Error::Validation`] for out-of-range token lifetimes and
    /// [`Error::Hashing`] if the configured work factor is unusable.
    pub fn new(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionTokenStore>,
        counters: Arc<dyn CounterStore>,
        oauth: OAuthProviders,
    ) -> Result<Self> {
        config.validate()?;
        let timeout = config.store_timeout();
        Ok(Self {
            hasher: PasswordHasher::new(config.password_work_factor())?,
            issuer: TokenIssuer::new(&config),
            refresh_tokens: RefreshTokens::new(
                sessions.clone(),
                config.refresh_token_ttl(),
                timeout,
            ),
            reconciler: Reconciler::new(credentials.clone(), timeout),
            rate_limiter: RateLimiter::new(
                counters,
                config.rate_limit_max(),
                config.rate_limit_window(),
            )
            .with_timeout(timeout),
            credentials,
            sessions,
            oauth,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthProviders {
        &self.oauth
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| Error::Hashing(format!("hashing task failed: {err}")))?
    }

    async fn verify_password(&self, credential: Option<String>, password: String) -> Result<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || match credential {
            Some(credential) => hasher.verify(&credential, &password),
            None => {
                hasher.verify_dummy(&password);
                Ok(false)
            }
        })
        .await
        .map_err(|err| Error::Hashing(format!("verification task failed: {err}")))?
    }

    async fn ensure_free(&self, field: UniqueField, value: &str) -> Result<()> {
        let lookup = match field {
            UniqueField::Email => self.credentials.get_by_email(value),
            _ => self.credentials.get_by_username(value),
        };
        match bounded(self.config.store_timeout(), lookup).await {
            Ok(_) => Err(Error::DuplicateAccount(field)),
            Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(Error::Store(err)),
        }
    }

    /// Create a password account and sign it in.
    ///
    /// # Errors
    /// [`Error::Validation`] for malformed input, [`Error::DuplicateAccount`]
    /// when the email or username is taken.
    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let email = normalize_email(email);
        let username = username.trim();
        validate_registration(&email, username, password)?;

        self.ensure_free(UniqueField::Email, &email).await?;
        self.ensure_free(UniqueField::Username, username).await?;

        let password_hash = self.hash_password(password.to_string()).await?;
        let account = bounded(
            self.config.store_timeout(),
            self.credentials.create_account(NewAccount::with_password(
                email,
                username.to_string(),
                password_hash,
            )),
        )
        .await?;
        info!(account_id = %account.id, "registered account");

        let tokens = self.issue_and_store_tokens(&account).await?;
        Ok(AuthResponse {
            user: account.view(),
            tokens,
        })
    }

    /// Password sign-in. Unknown email, OAuth-only account and wrong password
    /// all fail the same way and cost one hash verification.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCredentials`] on any mismatch.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let email = normalize_email(email);
        let account = match bounded(
            self.config.store_timeout(),
            self.credentials.get_by_email(&email),
        )
        .await
        {
            Ok(account) => Some(account),
            Err(StoreError::NotFound) => None,
            Err(err) => return Err(Error::Store(err)),
        };

        let credential = account
            .as_ref()
            .and_then(|account| account.password_hash.clone());
        let verified = self
            .verify_password(credential, password.to_string())
            .await?;
        let Some(account) = account.filter(|_| verified) else {
            debug!("password login rejected");
            return Err(Error::InvalidCredentials);
        };

        let tokens = self.issue_and_store_tokens(&account).await?;
        Ok(AuthResponse {
            user: account.view(),
            tokens,
        })
    }

    /// Rotate a refresh token. The presented token is consumed before
    /// anything else happens, so it is dead even if this call fails later.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] for unknown or replayed tokens,
    /// [`Error::ExpiredToken`] past expiry, [`Error::AccountNotFound`] when
    /// the owner was deleted.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse> {
        let record = self.refresh_tokens.consume(refresh_token).await?;
        let account = bounded(
            self.config.store_timeout(),
            self.credentials.get_by_id(record.user_id),
        )
        .await?;
        let tokens = self.issue_and_store_tokens(&account).await?;
        debug!(account_id = %account.id, "rotated refresh token");
        Ok(AuthResponse {
            user: account.view(),
            tokens,
        })
    }

    /// Revoke one refresh token. Unknown tokens are fine.
    ///
    /// # Errors
    /// Returns [`Error::Store`] on store failure.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.refresh_tokens.revoke(refresh_token).await
    }

    /// Revoke every refresh token held by `account_id`.
    ///
    /// # Errors
    /// Returns [`Error::Store`] on store failure.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<usize> {
        let revoked = self.refresh_tokens.revoke_all_for_account(account_id).await?;
        info!(revoked, "revoked all refresh tokens");
        Ok(revoked)
    }

    /// # Errors
    /// [`Error::InvalidToken`] or [`Error::ExpiredToken`].
    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        self.issuer.validate_access_token(token)
    }

    /// # Errors
    /// Returns [`Error::AccountNotFound`] for unknown ids.
    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountView> {
        let account = bounded(
            self.config.store_timeout(),
            self.credentials.get_by_id(account_id),
        )
        .await?;
        Ok(account.view())
    }

    /// Consent URL for `provider`, carrying `state`.
    ///
    /// # Errors
    /// Returns [`Error::OAuthExchange`] if the provider is not configured.
    pub fn authorization_url(&self, provider: Provider, state: &str) -> Result<String> {
        Ok(self.oauth.require(provider)?.authorization_url(state))
    }

    /// Complete an OAuth sign-in for `provider` with the callback `code`.
    ///
    /// # Errors
    /// See [`Reconciler::handle_callback`].
    pub async fn oauth_callback(&self, provider: Provider, code: &str) -> Result<AuthResponse> {
        let provider = self.oauth.require(provider)?;
        self.reconciler
            .handle_callback(provider.as_ref(), code, self)
            .await
    }

    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] once the key's window is full.
    pub async fn check_rate_limit(&self, key: &str) -> Result<RateLimitStatus> {
        self.rate_limiter.check(key).await
    }

    /// Ping both stores concurrently.
    pub async fn health(&self) -> StoreHealth {
        let timeout = self.config.store_timeout();
        let (credentials, sessions) = tokio::join!(
            bounded(timeout, self.credentials.ping()),
            bounded(timeout, self.sessions.ping())
        );
        if let Err(err) = &credentials {
            warn!("credential store unhealthy: {err}");
        }
        if let Err(err) = &sessions {
            warn!("session store unhealthy: {err}");
        }
        StoreHealth {
            credentials: credentials.is_ok(),
            sessions: sessions.is_ok(),
        }
    }
}

#[async_trait]
impl TokenIssuance for AuthService {
    async fn issue_and_store_tokens(&self, account: &Account) -> Result<TokenPair> {
        let expires_at = TimeDelta::try_days(self.config.refresh_token_days())
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| Error::Issuance("refresh token expiry out of range".to_string()))?;
        let access_token = self.issuer.issue_access_token(account)?;
        let refresh_token = self.issuer.issue_refresh_token()?;
        let record = RefreshTokenRecord {
            user_id: account.id,
            email: account.email.clone(),
            expires_at,
        };
        self.refresh_tokens.store(&refresh_token, &record).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.issuer.access_token_seconds(),
        })
    }
}
