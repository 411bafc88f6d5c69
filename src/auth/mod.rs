//! Session and identity lifecycle core.
//!
//! - [`password`]: Argon2id hashing and constant-time verification.
//! - [`token`]: HS256 access tokens and opaque refresh tokens.
//! - [`refresh`]: refresh-token storage, rotation, and revocation.
//! - [`reconcile`]: mapping OAuth identities onto local accounts.
//! - [`rate_limit`]: fixed-window limits per operation and caller.
//! - [`service`]: the [`AuthService`] facade tying them together.
//!
//! Nothing in here knows about HTTP; the `api` module adapts it.

pub mod config;
pub mod error;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod reconcile;
pub mod refresh;
pub mod service;
pub mod token;
pub mod utils;


pub use self::config::AuthConfig;
pub use self::error::{Error, Result};
pub use self::rate_limit::{RateLimitIdentity, RateLimitStatus, RateLimiter, rate_limit_key};
pub use self::service::{AuthService, StoreHealth, TokenIssuance};
