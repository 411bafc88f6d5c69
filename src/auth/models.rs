//! Accounts, claims, and the token records that flow through the lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Supported federated identity providers. Each one owns a dedicated id slot
/// on the account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Google,
}

impl Provider {
    pub const ALL: [Self; 2] = [Self::Github, Self::Google];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "google" => Ok(Self::Google),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// Full account row as held by the credential store.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// Absent for accounts created through an OAuth provider.
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub github_id: Option<String>,
    pub google_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Github => self.github_id.as_deref(),
            Provider::Google => self.google_id.as_deref(),
        }
    }

    #[must_use]
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            created_at: self.created_at,
        }
    }
}

/// Fields supplied when creating an account; id and timestamps are assigned
/// by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub github_id: Option<String>,
    pub google_id: Option<String>,
}

impl NewAccount {
    #[must_use]
    pub fn with_password(email: String, username: String, password_hash: String) -> Self {
        Self {
            email,
            username,
            password_hash: Some(password_hash),
            ..Self::default()
        }
    }

    /// Account for a first-seen external identity. The password stays absent.
    #[must_use]
    pub fn federated(identity: &ExternalIdentity, username: String) -> Self {
        let mut account = Self {
            email: identity.email.clone(),
            username,
            avatar_url: identity.avatar_url.clone(),
            ..Self::default()
        };
        match identity.provider {
            Provider::Github => account.github_id = Some(identity.provider_user_id.clone()),
            Provider::Google => account.google_id = Some(identity.provider_user_id.clone()),
        }
        account
    }
}

/// Client-safe projection of an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Identity asserted inside an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Returned once to the caller and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Value stored under each refresh token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Account plus a fresh token pair, as handed back by login-like operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: AccountView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Profile returned by a provider after a successful code exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: Provider,
    pub provider_user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Provider handle (GitHub login) when the provider has one.
    pub preferred_username: Option<String>,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(provider: Provider) -> ExternalIdentity {
        ExternalIdentity {
            provider,
            provider_user_id: "4242".to_string(),
            email: "octo@example.com".to_string(),
            display_name: Some("Octo Cat".to_string()),
            preferred_username: Some("octocat".to_string()),
            avatar_url: Some("https://avatars.example.com/4242".to_string()),
        }
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("GitHub".parse::<Provider>(), Ok(Provider::Github));
        assert_eq!(" google ".parse::<Provider>(), Ok(Provider::Google));
        assert!("gitlab".parse::<Provider>().is_err());
        assert_eq!(Provider::Google.to_string(), "google");
    }

    #[test]
    fn federated_account_fills_only_its_provider_slot() {
        let github = NewAccount::federated(&identity(Provider::Github), "octocat".to_string());
        assert_eq!(github.github_id.as_deref(), Some("4242"));
        assert!(github.google_id.is_none());
        assert!(github.password_hash.is_none());

        let google = NewAccount::federated(&identity(Provider::Google), "octo".to_string());
        assert_eq!(google.google_id.as_deref(), Some("4242"));
        assert!(google.github_id.is_none());
    }

    #[test]
    fn auth_response_flattens_token_pair() {
        let now = Utc::now();
        let response = AuthResponse {
            user: AccountView {
                id: Uuid::nil(),
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                avatar_url: None,
                created_at: now,
            },
            tokens: TokenPair {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_in: 900,
            },
        };
        let json = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(json["access_token"], "access");
        assert_eq!(json["refresh_token"], "refresh");
        assert_eq!(json["expires_in"], 900);
        assert_eq!(json["user"]["username"], "alice");
    }

    #[test]
    fn refresh_record_expiry_is_strict() {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            user_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            expires_at: now,
        };
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + chrono::Duration::seconds(1)));
    }
}
