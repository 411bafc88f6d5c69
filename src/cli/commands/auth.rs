use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::{
    DEFAULT_ACCESS_TOKEN_MINUTES, DEFAULT_PASSWORD_WORK_FACTOR, DEFAULT_REFRESH_TOKEN_DAYS,
    DEFAULT_STORE_TIMEOUT_SECONDS, MAX_ACCESS_TOKEN_MINUTES, MAX_REFRESH_TOKEN_DAYS,
};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TOKEN_MINUTES: &str = "access-token-minutes";
pub const ARG_REFRESH_TOKEN_DAYS: &str = "refresh-token-days";
pub const ARG_PASSWORD_WORK_FACTOR: &str = "password-work-factor";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub jwt_secret: SecretString,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub password_work_factor: u32,
    pub store_timeout_seconds: u64,
}

impl Options {
    /// Parse token and hashing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let jwt_secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let access_token_minutes = matches
            .get_one::<i64>(ARG_ACCESS_TOKEN_MINUTES)
            .copied()
            .unwrap_or(DEFAULT_ACCESS_TOKEN_MINUTES);
        let refresh_token_days = matches
            .get_one::<i64>(ARG_REFRESH_TOKEN_DAYS)
            .copied()
            .unwrap_or(DEFAULT_REFRESH_TOKEN_DAYS);

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            jwt_secret,
            access_token_minutes,
            refresh_token_days,
            password_work_factor: matches
                .get_one::<u32>(ARG_PASSWORD_WORK_FACTOR)
                .copied()
                .unwrap_or(DEFAULT_PASSWORD_WORK_FACTOR),
            store_timeout_seconds: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_STORE_TIMEOUT_SECONDS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used for CORS and OAuth redirects")
                .env("TESSERA_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret for access tokens")
                .env("TESSERA_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_MINUTES)
                .long(ARG_ACCESS_TOKEN_MINUTES)
                .help("Access token lifetime in minutes, at most one day")
                .env("TESSERA_ACCESS_TOKEN_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_ACCESS_TOKEN_MINUTES)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_DAYS)
                .long(ARG_REFRESH_TOKEN_DAYS)
                .help("Refresh token lifetime in days, at most one year")
                .env("TESSERA_REFRESH_TOKEN_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_REFRESH_TOKEN_DAYS)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_WORK_FACTOR)
                .long(ARG_PASSWORD_WORK_FACTOR)
                .help("Argon2id time cost for password hashing")
                .env("TESSERA_PASSWORD_WORK_FACTOR")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Deadline for each credential or session store call")
                .env("TESSERA_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
