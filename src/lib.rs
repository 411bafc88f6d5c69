//! # Tessera
//!
//! Session and identity lifecycle manager. Accounts sign in with a password or
//! through an external OAuth provider and receive a token pair:
//!
//! - a short-lived HS256 **access token** carrying the account id, verified offline;
//! - an opaque **refresh token** kept in a session store, rotated on every use and
//!   revocable at logout.
//!
//! ## Layout
//!
//! - [`auth`]: password hashing, token issuance, refresh lifecycle, OAuth
//!   reconciliation, rate limiting and the [`auth::AuthService`] facade.
//! - [`oauth`]: GitHub and Google authorization-code clients.
//! - [`store`]: storage seams with `PostgreSQL`, Redis and in-memory backends.
//! - [`api`]: the HTTP surface under `/api/v1`.
//! - [`cli`]: argument parsing, telemetry and server start-up.
//!
//! The schema for the credential store lives in `sql/schema.sql`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod oauth;
pub mod store;

pub use auth::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_hex_or_unknown() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert_eq!(
            APP_USER_AGENT,
            format!("tessera/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
