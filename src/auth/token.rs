//! HS256 access tokens and opaque refresh tokens.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::collections::HashSet;

use super::{
    config::AuthConfig,
    error::{Error, Result},
    models::{Account, Claims},
    utils::generate_refresh_token,
};

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_seconds: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_token_seconds", &self.access_token_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.signing_secret();
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand so the boundary is exactly `now > exp`
        // with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::new();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_token_seconds: config.access_token_seconds(),
        }
    }

    #[must_use]
    pub fn access_token_seconds(&self) -> i64 {
        self.access_token_seconds
    }

    /// Mint a signed access token for `account`, valid from now.
    ///
    /// # Errors
    /// Returns [`Error::Issuance`] if signing fails or the expiry overflows.
    pub fn issue_access_token(&self, account: &Account) -> Result<String> {
        self.issue_access_token_at(account, Utc::now().timestamp())
    }

    pub(crate) fn issue_access_token_at(&self, account: &Account, now: i64) -> Result<String> {
        let exp = now
            .checked_add(self.access_token_seconds)
            .ok_or_else(|| Error::Issuance("access token expiry out of range".to_string()))?;
        let claims = Claims {
            user_id: account.id,
            email: account.email.clone(),
            username: account.username.clone(),
            iat: now,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| Error::Issuance(format!("failed to sign access token: {err}")))
    }

    /// # Errors
    /// Returns [`Error::Hashing`] if the OS entropy source fails.
    pub fn issue_refresh_token(&self) -> Result<String> {
        generate_refresh_token()
    }

    /// Verify signature and algorithm, then expiry. No store lookup.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] for a bad signature, wrong algorithm or
    /// malformed claims; [`Error::ExpiredToken`] when `now > exp`.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        self.validate_access_token_at(token, Utc::now().timestamp())
    }

    pub(crate) fn validate_access_token_at(&self, token: &str, now: i64) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| Error::InvalidToken)?;
        if now > data.claims.exp {
            return Err(Error::ExpiredToken);
        }
        Ok(data.claims)
    }
}
