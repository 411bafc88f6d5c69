//! Error taxonomy for the session and identity lifecycle.
//!
//! Every variant is recoverable at the request boundary. The HTTP layer maps
//! them to status codes; nothing here is fatal to the process.

use crate::store::{StoreError, UniqueField};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong password or unknown identifier. Both share one message so callers
    /// cannot probe which accounts exist.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("oauth exchange failed: {0}")]
    OAuthExchange(String),
    #[error("account with this {0} already exists")]
    DuplicateAccount(UniqueField),
    #[error("account not found")]
    AccountNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    /// Signing failed or a token lifetime fell outside the representable range.
    #[error("token issuance failed: {0}")]
    Issuance(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::AccountNotFound,
            StoreError::Conflict(field) => Self::DuplicateAccount(field),
            other => Self::Store(other),
        }
    }
}

impl Error {
    /// Timeouts and store outages; callers may retry these later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
