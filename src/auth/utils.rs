//! Input validation, username derivation, and token generation helpers.

use base64::Engine;
use once_cell::sync::Lazy;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;

use super::error::{Error, Result};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 100;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Registration input rules: email format, username and password lengths.
///
/// # Errors
/// Returns [`Error::Validation`] naming the first offending field.
pub fn validate_registration(email: &str, username: &str, password: &str) -> Result<()> {
    if !valid_email(email) {
        return Err(Error::Validation("invalid email address".to_string()));
    }
    let username_len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
        return Err(Error::Validation(format!(
            "username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }
    let password_len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password_len) {
        return Err(Error::Validation(format!(
            "password must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// 32 bytes of OS randomness, URL-safe base64 without padding.
///
/// # Errors
/// Returns [`Error::Hashing`] if the OS entropy source fails.
pub fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::Hashing(format!("entropy source unavailable: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Username base for a federated signup: lowercase ASCII alphanumerics plus
/// `_`, `-` and `.`, clipped so numeric suffixes still fit.
#[must_use]
pub fn sanitize_username(raw: &str) -> String {
    let mut base: String = raw
        .trim()
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')).then_some(c)
        })
        .take(USERNAME_MAX_LEN - 9)
        .collect();
    while base.chars().count() < USERNAME_MIN_LEN {
        base.push('_');
    }
    base
}

/// Deterministic candidates for a username base: `base`, `base2` .. `base99`,
/// then `base-<first 8 chars of the provider id>`.
pub fn username_candidates(base: &str, provider_user_id: &str) -> impl Iterator<Item = String> {
    let base = base.to_string();
    let tail: String = provider_user_id.chars().take(8).collect();
    let fallback = format!("{base}-{tail}");
    std::iter::once(base.clone())
        .chain((2..=99).map(move |n| format!("{base}{n}")))
        .chain(std::iter::once(fallback))
}

/// Extract a client IP for rate limiting from common proxy headers.
#[must_use]
pub fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn validate_registration_rules() {
        assert!(validate_registration("a@x.com", "alice", "longenough1").is_ok());
        assert!(matches!(
            validate_registration("nope", "alice", "longenough1"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_registration("a@x.com", "al", "longenough1"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_registration("a@x.com", "alice", "short"),
            Err(Error::Validation(_))
        ));
        let long_password = "p".repeat(101);
        assert!(validate_registration("a@x.com", "alice", &long_password).is_err());
    }

    #[test]
    fn refresh_token_is_url_safe_32_bytes() {
        let token = generate_refresh_token().unwrap_or_default();
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        let decoded_len = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .ok()
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
        assert_ne!(Some(token), generate_refresh_token().ok());
    }

    #[test]
    fn sanitize_username_strips_and_pads() {
        assert_eq!(sanitize_username("Octo Cat!"), "octocat");
        assert_eq!(sanitize_username("jo"), "jo_");
        assert_eq!(sanitize_username("ñ"), "___");
        assert_eq!(sanitize_username(&"a".repeat(80)).len(), USERNAME_MAX_LEN - 9);
    }

    #[test]
    fn username_candidates_are_deterministic() {
        let candidates: Vec<String> = username_candidates("alice", "123456789012").collect();
        assert_eq!(candidates[0], "alice");
        assert_eq!(candidates[1], "alice2");
        assert_eq!(candidates[2], "alice3");
        assert_eq!(candidates[98], "alice99");
        assert_eq!(candidates.last().map(String::as_str), Some("alice-12345678"));
        assert_eq!(candidates.len(), 100);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
