//! In-process store implementations for tests and single-node development.
//!
//! They honor the same contracts as the Postgres and Redis adapters: unique
//! constraints, per-key TTL, atomic take, and window-on-create counters.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CounterStore, CredentialStore, SessionTokenStore, StoreError, UniqueField};
use crate::auth::models::{Account, NewAccount, Provider};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }
}

/// First unique column of `candidate` already taken by an account other than `skip`.
fn conflicting_field<'a>(
    accounts: impl Iterator<Item = &'a Account>,
    skip: Option<Uuid>,
    email: &str,
    username: &str,
    github_id: Option<&str>,
    google_id: Option<&str>,
) -> Option<UniqueField> {
    for existing in accounts {
        if Some(existing.id) == skip {
            continue;
        }
        if existing.email == email {
            return Some(UniqueField::Email);
        }
        if existing.username == username {
            return Some(UniqueField::Username);
        }
        if github_id.is_some() && existing.github_id.as_deref() == github_id {
            return Some(UniqueField::ProviderId(Provider::Github));
        }
        if google_id.is_some() && existing.google_id.as_deref() == google_id {
            return Some(UniqueField::ProviderId(Provider::Google));
        }
    }
    None
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if let Some(field) = conflicting_field(
            accounts.values(),
            None,
            &account.email,
            &account.username,
            account.github_id.as_deref(),
            account.google_id.as_deref(),
        ) {
            return Err(StoreError::Conflict(field));
        }

        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            email: account.email,
            username: account.username,
            password_hash: account.password_hash,
            avatar_url: account.avatar_url,
            github_id: account.github_id,
            google_id: account.google_id,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        self.accounts
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.accounts
            .lock()
            .await
            .values()
            .find(|account| account.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.accounts
            .lock()
            .await
            .values()
            .find(|account| account.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Account, StoreError> {
        self.accounts
            .lock()
            .await
            .values()
            .find(|account| account.provider_id(provider) == Some(provider_user_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, account: &Account) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if !accounts.contains_key(&account.id) {
            return Err(StoreError::NotFound);
        }
        if let Some(field) = conflicting_field(
            accounts.values(),
            Some(account.id),
            &account.email,
            &account.username,
            account.github_id.as_deref(),
            account.google_id.as_deref(),
        ) {
            return Err(StoreError::Conflict(field));
        }

        let mut updated = account.clone();
        updated.updated_at = Utc::now();
        accounts.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.accounts.lock().await.remove(&id);
        Ok(())
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionTokenStore for MemorySessionStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Reap on read, like a TTL store would have done already.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .await
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}

#[derive(Debug)]
struct Counter {
    count: u64,
    window_ends: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        Ok(self
            .counters
            .lock()
            .await
            .get(key)
            .filter(|counter| now < counter.window_ends)
            .map_or(0, |counter| counter.count))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            window_ends: now + window,
        });
        if now >= counter.window_ends {
            counter.count = 0;
            counter.window_ends = now + window;
        }
        counter.count += 1;
        Ok(counter.count)
    }
}
