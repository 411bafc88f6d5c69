//! Persistence contracts consumed by the lifecycle core.
//!
//! Two tiers are involved and no transaction spans them:
//!
//! - [`CredentialStore`]: durable account records (`PostgreSQL` in production).
//! - [`SessionTokenStore`]: refresh-token records with per-key TTL (Redis).
//!
//! [`CounterStore`] backs the fixed-window rate limiter and normally shares the
//! Redis deployment with the session tier.
//!
//! Every adapter must keep "not found" and "unique constraint violated" apart,
//! the reconciler depends on that distinction to resolve creation races.

pub mod memory;
pub mod postgres;
pub mod redis;

use async_trait::async_trait;
use std::{fmt, time::Duration};
use uuid::Uuid;

use crate::auth::models::{Account, NewAccount, Provider};

pub use self::memory::{MemoryCounterStore, MemoryCredentialStore, MemorySessionStore};
pub use self::postgres::PgCredentialStore;
pub use self::redis::{RedisCounterStore, RedisSessionStore};

/// Account column guarded by a uniqueness constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniqueField {
    Email,
    Username,
    ProviderId(Provider),
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Username => f.write_str("username"),
            Self::ProviderId(provider) => write!(f, "{provider} id"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated on {0}")]
    Conflict(UniqueField),
    #[error("store operation timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new account. Fails with [`StoreError::Conflict`] naming the
    /// first violated unique column.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Account, StoreError>;
    async fn get_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Account, StoreError>;
    async fn update(&self, account: &Account) -> Result<Account, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Liveness probe for `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionTokenStore: Send + Sync {
    /// Unconditional upsert; the store drops the key once `ttl` elapses.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Atomically read and delete. Two concurrent callers never both see the value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Idempotent; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Every live `(key, value)` pair. Used only by bulk revocation.
    async fn scan_all(&self) -> Result<Vec<(String, String)>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `key`, zero when absent or expired.
    async fn get(&self, key: &str) -> Result<u64, StoreError>;
    /// Increment `key` and return the new count. The window expiry is set in
    /// the same atomic step that creates the key, and never extended after.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;
}

/// Run a store call under `limit`; an elapsed deadline becomes [`StoreError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}
