//! Federated identity reconciliation.
//!
//! Maps a verified external identity onto exactly one local account. The
//! provider-id unique constraint in the credential store is the arbiter when
//! two callbacks for the same identity race: one insert wins and the other
//! falls back to a lookup.

use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

use super::{
    error::{Error, Result},
    models::{Account, AuthResponse, ExternalIdentity, NewAccount},
    service::TokenIssuance,
    utils::{normalize_email, sanitize_username, username_candidates},
};
use crate::{
    oauth::OAuthProvider,
    store::{CredentialStore, StoreError, UniqueField, bounded},
};

#[derive(Clone)]
pub struct Reconciler {
    credentials: Arc<dyn CredentialStore>,
    timeout: Duration,
}

/// Username seed: the provider handle when there is one, else the email local part.
fn username_base(identity: &ExternalIdentity) -> String {
    let raw = identity
        .preferred_username
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| identity.email.split('@').next().unwrap_or_default());
    sanitize_username(raw)
}

impl Reconciler {
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        Self {
            credentials,
            timeout,
        }
    }

    /// Exchange `code` with `provider`, reconcile the resulting identity and
    /// hand the account to `issuance` for a fresh token pair.
    ///
    /// # Errors
    /// [`Error::OAuthExchange`] if the provider calls fail (never retried),
    /// [`Error::DuplicateAccount`] if the email belongs to another account.
    #[instrument(skip(self, provider, code, issuance), fields(provider = %provider.provider()))]
    pub async fn handle_callback(
        &self,
        provider: &dyn OAuthProvider,
        code: &str,
        issuance: &dyn TokenIssuance,
    ) -> Result<AuthResponse> {
        let access_token = provider.exchange_code(code).await?;
        let identity = provider.fetch_profile(&access_token).await?;
        let account = self.reconcile(&identity).await?;
        let tokens = issuance.issue_and_store_tokens(&account).await?;
        Ok(AuthResponse {
            user: account.view(),
            tokens,
        })
    }

    /// Find the account linked to `identity`, creating it on first sight.
    ///
    /// # Errors
    /// [`Error::DuplicateAccount`] when the identity's email is already taken
    /// by an unlinked account; [`Error::Store`] on store failures.
    pub async fn reconcile(&self, identity: &ExternalIdentity) -> Result<Account> {
        match self.find_linked(identity).await {
            Ok(account) => {
                debug!(account_id = %account.id, "external identity already linked");
                return Ok(account);
            }
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(Error::Store(err)),
        }

        let mut identity = identity.clone();
        identity.email = normalize_email(&identity.email);
        self.create_linked(&identity).await
    }

    async fn find_linked(&self, identity: &ExternalIdentity) -> Result<Account, StoreError> {
        bounded(
            self.timeout,
            self.credentials
                .get_by_provider_id(identity.provider, &identity.provider_user_id),
        )
        .await
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        match bounded(self.timeout, self.credentials.get_by_username(username)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(err) => Err(Error::Store(err)),
        }
    }

    async fn create_linked(&self, identity: &ExternalIdentity) -> Result<Account> {
        let base = username_base(identity);
        for candidate in username_candidates(&base, &identity.provider_user_id) {
            if self.username_taken(&candidate).await? {
                continue;
            }
            let new_account = NewAccount::federated(identity, candidate.clone());
            match bounded(self.timeout, self.credentials.create_account(new_account)).await {
                Ok(account) => {
                    info!(
                        account_id = %account.id,
                        provider = %identity.provider,
                        username = %account.username,
                        "created account for external identity"
                    );
                    return Ok(account);
                }
                // Lost a race for this name; move on to the next candidate.
                Err(StoreError::Conflict(UniqueField::Username)) => {}
                Err(StoreError::Conflict(UniqueField::ProviderId(_))) => {
                    debug!("concurrent signup linked this identity first, retrying as lookup");
                    return match self.find_linked(identity).await {
                        Ok(account) => Ok(account),
                        Err(StoreError::NotFound) => Err(Error::DuplicateAccount(
                            UniqueField::ProviderId(identity.provider),
                        )),
                        Err(err) => Err(Error::Store(err)),
                    };
                }
                Err(StoreError::Conflict(UniqueField::Email)) => {
                    // The racing insert may have tripped the email constraint first.
                    if let Ok(account) = self.find_linked(identity).await {
                        return Ok(account);
                    }
                    warn!(
                        provider = %identity.provider,
                        "external identity email already belongs to another account"
                    );
                    return Err(Error::DuplicateAccount(UniqueField::Email));
                }
                Err(err) => return Err(Error::Store(err)),
            }
        }
        Err(Error::DuplicateAccount(UniqueField::Username))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::models::Provider;
    use crate::store::MemoryCredentialStore;

    fn identity(id: &str, email: &str, login: Option<&str>) -> ExternalIdentity {
        ExternalIdentity {
            provider: Provider::Github,
            provider_user_id: id.to_string(),
            email: email.to_string(),
            display_name: None,
            preferred_username: login.map(str::to_string),
            avatar_url: Some(format!("https://avatars.example.com/{id}")),
        }
    }

    fn reconciler() -> (Reconciler, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        (
            Reconciler::new(store.clone(), Duration::from_secs(1)),
            store,
        )
    }

    #[test]
    fn username_base_prefers_handle_then_email() {
        assert_eq!(
            username_base(&identity("1", "x@y.com", Some("OctoCat"))),
            "octocat"
        );
        assert_eq!(
            username_base(&identity("1", "jane.doe@y.com", None)),
            "jane.doe"
        );
        assert_eq!(username_base(&identity("1", "jd@y.com", Some(" "))), "jd_");
    }

    #[tokio::test]
    async fn first_sight_creates_then_links() {
        let (reconciler, store) = reconciler();
        let ident = identity("42", "Octo@Example.com", Some("octocat"));

        let first = reconciler.reconcile(&ident).await.unwrap();
        assert_eq!(first.email, "octo@example.com");
        assert_eq!(first.username, "octocat");
        assert_eq!(first.github_id.as_deref(), Some("42"));
        assert!(first.password_hash.is_none());
        assert_eq!(
            first.avatar_url.as_deref(),
            Some("https://avatars.example.com/42")
        );

        let second = reconciler.reconcile(&ident).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn username_collisions_get_numeric_suffixes() {
        let (reconciler, _) = reconciler();
        let a = reconciler
            .reconcile(&identity("1", "a@x.com", Some("sam")))
            .await
            .unwrap();
        let b = reconciler
            .reconcile(&identity("2", "b@x.com", Some("sam")))
            .await
            .unwrap();
        let c = reconciler
            .reconcile(&identity("3", "c@x.com", Some("sam")))
            .await
            .unwrap();
        assert_eq!(
            [a.username, b.username, c.username],
            ["sam", "sam2", "sam3"]
        );
    }

    #[tokio::test]
    async fn email_owned_by_other_account_is_duplicate() {
        let (reconciler, store) = reconciler();
        store
            .create_account(NewAccount::with_password(
                "a@x.com".to_string(),
                "alice".to_string(),
                "$argon2id$stub".to_string(),
            ))
            .await
            .unwrap();
        assert!(matches!(
            reconciler
                .reconcile(&identity("9", "a@x.com", Some("octo")))
                .await,
            Err(Error::DuplicateAccount(UniqueField::Email))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_sight_creates_one_account() {
        let (reconciler, store) = reconciler();
        let ident = identity("77", "race@x.com", Some("racer"));
        let (left, right) = tokio::join!(reconciler.reconcile(&ident), reconciler.reconcile(&ident));
        assert_eq!(left.unwrap().id, right.unwrap().id);
        assert_eq!(store.len().await, 1);
    }
}
