//! Fixed-window rate limiting for sensitive operations.
//!
//! Each (operation path, caller identity) pair owns a counter whose window
//! starts at the first hit and is never extended. A full window fails closed;
//! an unreachable counter store fails open.

use std::{fmt, sync::Arc, time::Duration};
use tracing::warn;
use uuid::Uuid;

use super::error::{Error, Result};
use crate::store::{CounterStore, bounded};

/// Key namespace for rate-limit counters.
pub const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// Who is being limited: the authenticated account when known, else the
/// caller's network address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitIdentity {
    Account(Uuid),
    Address(String),
    Unknown,
}

impl RateLimitIdentity {
    #[must_use]
    pub fn resolve(account_id: Option<Uuid>, address: Option<String>) -> Self {
        match (account_id, address) {
            (Some(id), _) => Self::Account(id),
            (None, Some(address)) => Self::Address(address),
            (None, None) => Self::Unknown,
        }
    }
}

impl fmt::Display for RateLimitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(id) => write!(f, "{id}"),
            Self::Address(address) => f.write_str(address),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// `ratelimit:<path>:<identity>`
#[must_use]
pub fn rate_limit_key(path: &str, identity: &RateLimitIdentity) -> String {
    format!("{RATE_LIMIT_PREFIX}{path}:{identity}")
}

/// Budget left after an allowed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max: u64,
    window: Duration,
    timeout: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, max: u64, window: Duration) -> Self {
        Self {
            store,
            max,
            window,
            timeout: Duration::from_secs(crate::auth::config::DEFAULT_STORE_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check `key` against the configured budget.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] once the window is full.
    pub async fn check(&self, key: &str) -> Result<RateLimitStatus> {
        self.check_with(key, self.max, self.window).await
    }

    /// Check `key` against an explicit budget.
    ///
    /// # Errors
    /// Returns [`Error::RateLimitExceeded`] once `max` requests were counted
    /// in the current window.
    pub async fn check_with(&self, key: &str, max: u64, window: Duration) -> Result<RateLimitStatus> {
        let current = match bounded(self.timeout, self.store.get(key)).await {
            Ok(count) => count,
            Err(err) => {
                warn!(key, "rate limit store unavailable, allowing request: {err}");
                return Ok(RateLimitStatus {
                    limit: max,
                    remaining: max,
                });
            }
        };
        if current >= max {
            return Err(Error::RateLimitExceeded);
        }

        let count = match bounded(self.timeout, self.store.increment(key, window)).await {
            Ok(count) => count,
            Err(err) => {
                warn!(key, "rate limit increment failed, allowing request: {err}");
                current + 1
            }
        };
        Ok(RateLimitStatus {
            limit: max,
            remaining: max.saturating_sub(count),
        })
    }
}
