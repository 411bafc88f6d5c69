//! Lifecycle configuration: token lifetimes, hashing cost, and limits.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::error::{Error, Result};

pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 15;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 30;
pub const DEFAULT_PASSWORD_WORK_FACTOR: u32 = 3;
pub const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_RATE_LIMIT_MAX: u64 = 5;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

/// One day.
pub const MAX_ACCESS_TOKEN_MINUTES: i64 = 24 * 60;
/// One year.
pub const MAX_REFRESH_TOKEN_DAYS: i64 = 365;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    signing_secret: SecretString,
    access_token_minutes: i64,
    refresh_token_days: i64,
    password_work_factor: u32,
    store_timeout: Duration,
    rate_limit_max: u64,
    rate_limit_window: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(signing_secret: SecretString) -> Self {
        Self {
            signing_secret,
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TOKEN_DAYS,
            password_work_factor: DEFAULT_PASSWORD_WORK_FACTOR,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_token_minutes(mut self, minutes: i64) -> Self {
        self.access_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_days(mut self, days: i64) -> Self {
        self.refresh_token_days = days;
        self
    }

    #[must_use]
    pub fn with_password_work_factor(mut self, work_factor: u32) -> Self {
        self.password_work_factor = work_factor;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, max: u64, window: Duration) -> Self {
        self.rate_limit_max = max;
        self.rate_limit_window = window;
        self
    }

    /// Reject token lifetimes outside `1..=MAX_*`.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ACCESS_TOKEN_MINUTES).contains(&self.access_token_minutes) {
            return Err(Error::Validation(format!(
                "access token lifetime must be between 1 and {MAX_ACCESS_TOKEN_MINUTES} minutes"
            )));
        }
        if !(1..=MAX_REFRESH_TOKEN_DAYS).contains(&self.refresh_token_days) {
            return Err(Error::Validation(format!(
                "refresh token lifetime must be between 1 and {MAX_REFRESH_TOKEN_DAYS} days"
            )));
        }
        Ok(())
    }

    pub(crate) fn signing_secret(&self) -> &[u8] {
        self.signing_secret.expose_secret().as_bytes()
    }

    #[must_use]
    pub fn access_token_minutes(&self) -> i64 {
        self.access_token_minutes
    }

    /// Access-token lifetime in seconds, as reported in `expires_in`.
    #[must_use]
    pub fn access_token_seconds(&self) -> i64 {
        self.access_token_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn refresh_token_days(&self) -> i64 {
        self.refresh_token_days
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        let seconds =
            u64::try_from(self.refresh_token_days.saturating_mul(24 * 60 * 60)).unwrap_or(0);
        Duration::from_secs(seconds)
    }

    #[must_use]
    pub fn password_work_factor(&self) -> u32 {
        self.password_work_factor
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn rate_limit_max(&self) -> u64 {
        self.rate_limit_max
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AuthConfig::new(SecretString::from("secret"));
        assert_eq!(config.access_token_minutes(), 15);
        assert_eq!(config.access_token_seconds(), 900);
        assert_eq!(config.refresh_token_days(), 30);
        assert_eq!(
            config.refresh_token_ttl(),
            Duration::from_secs(30 * 24 * 60 * 60)
        );
        assert_eq!(config.password_work_factor(), 3);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.rate_limit_max(), 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new(SecretString::from("secret"))
            .with_access_token_minutes(5)
            .with_refresh_token_days(1)
            .with_password_work_factor(1)
            .with_store_timeout(Duration::from_millis(250))
            .with_rate_limit(10, Duration::from_secs(30));
        assert_eq!(config.access_token_seconds(), 300);
        assert_eq!(config.refresh_token_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.password_work_factor(), 1);
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.rate_limit_max(), 10);
        assert_eq!(config.signing_secret(), b"secret");
    }

    #[test]
    fn negative_refresh_days_yield_zero_ttl() {
        let config = AuthConfig::new(SecretString::from("secret")).with_refresh_token_days(-1);
        assert_eq!(config.refresh_token_ttl(), Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn lifetimes_are_bounded() {
        let config = || AuthConfig::new(SecretString::from("secret"));
        assert!(config().validate().is_ok());
        assert!(
            config()
                .with_access_token_minutes(MAX_ACCESS_TOKEN_MINUTES)
                .with_refresh_token_days(MAX_REFRESH_TOKEN_DAYS)
                .validate()
                .is_ok()
        );
        assert!(matches!(
            config()
                .with_access_token_minutes(MAX_ACCESS_TOKEN_MINUTES + 1)
                .validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            config()
                .with_refresh_token_days(MAX_REFRESH_TOKEN_DAYS + 1)
                .validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            config().with_access_token_minutes(0).validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn oversized_lifetimes_saturate_instead_of_overflowing() {
        let config = AuthConfig::new(SecretString::from("secret"))
            .with_access_token_minutes(i64::MAX)
            .with_refresh_token_days(i64::MAX);
        assert_eq!(config.access_token_seconds(), i64::MAX);
        assert_eq!(
            config.refresh_token_ttl(),
            Duration::from_secs(i64::MAX.unsigned_abs())
        );
    }
}
