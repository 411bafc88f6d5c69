//! Refresh-token records in the session token store.
//!
//! A record is Active until it is consumed by a refresh, revoked, or its
//! absolute expiry passes. Consumed and revoked tokens are deleted, so
//! replaying one is indistinguishable from presenting an unknown token.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    error::{Error, Result},
    models::RefreshTokenRecord,
};
use crate::store::{SessionTokenStore, StoreError, bounded};

#[derive(Clone)]
pub struct RefreshTokens {
    store: Arc<dyn SessionTokenStore>,
    ttl: Duration,
    timeout: Duration,
}

fn decode(token_value: &str) -> Result<RefreshTokenRecord> {
    serde_json::from_str(token_value)
        .map_err(|err| Error::Store(StoreError::Corrupt(format!("refresh token record: {err}"))))
}

impl RefreshTokens {
    #[must_use]
    pub fn new(store: Arc<dyn SessionTokenStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Unconditional upsert; the store drops the record after the configured lifetime.
    ///
    /// # Errors
    /// Returns [`Error::Store`] on timeout or store failure.
    pub async fn store(&self, token: &str, record: &RefreshTokenRecord) -> Result<()> {
        let value = serde_json::to_string(record)
            .map_err(|err| Error::Store(StoreError::Corrupt(err.to_string())))?;
        bounded(self.timeout, self.store.put(token, &value, self.ttl)).await?;
        Ok(())
    }

    /// Read a record without consuming it. An expired record is purged.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] when absent, [`Error::ExpiredToken`] when past expiry.
    pub async fn lookup(&self, token: &str) -> Result<RefreshTokenRecord> {
        let value = bounded(self.timeout, self.store.get(token))
            .await?
            .ok_or(Error::InvalidToken)?;
        let record = decode(&value)?;
        if record.is_expired_at(Utc::now()) {
            self.revoke(token).await?;
            return Err(Error::ExpiredToken);
        }
        Ok(record)
    }

    /// Atomically read and delete. At most one caller gets the record.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] when absent or already consumed;
    /// [`Error::ExpiredToken`] when past expiry (the record is gone either way).
    pub async fn consume(&self, token: &str) -> Result<RefreshTokenRecord> {
        let value = bounded(self.timeout, self.store.take(token))
            .await?
            .ok_or(Error::InvalidToken)?;
        let record = decode(&value)?;
        if record.is_expired_at(Utc::now()) {
            return Err(Error::ExpiredToken);
        }
        Ok(record)
    }

    /// Idempotent delete.
    ///
    /// # Errors
    /// Returns [`Error::Store`] on timeout or store failure.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        bounded(self.timeout, self.store.delete(token)).await?;
        Ok(())
    }

    /// Delete every live record owned by `account_id`, returning how many went.
    ///
    /// This walks every outstanding refresh token, so its cost grows with the
    /// whole token population rather than with one account's sessions.
    ///
    /// # Errors
    /// Returns [`Error::Store`] on timeout or store failure.
    pub async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<usize> {
        let entries = bounded(self.timeout, self.store.scan_all()).await?;
        let scanned = entries.len();
        let mut revoked = 0;
        for (token, value) in entries {
            match decode(&value) {
                Ok(record) if record.user_id == account_id => {
                    self.revoke(&token).await?;
                    revoked += 1;
                }
                Ok(_) => {}
                Err(err) => warn!("skipping unreadable refresh token record: {err}"),
            }
        }
        if scanned > 10_000 {
            warn!(scanned, "bulk refresh token revocation scanned a large keyspace");
        }
        debug!(%account_id, scanned, revoked, "revoked refresh tokens for account");
        Ok(revoked)
    }
}
