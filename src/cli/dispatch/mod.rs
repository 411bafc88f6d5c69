//! Map validated CLI matches to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, ARG_REDIS_URL, auth, oauth, rate_limit};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let redis_url = matches
        .get_one::<String>(ARG_REDIS_URL)
        .cloned()
        .context("missing required argument: --redis-url")?;

    let auth_opts = auth::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url,
        frontend_base_url: auth_opts.frontend_base_url,
        jwt_secret: auth_opts.jwt_secret,
        access_token_minutes: auth_opts.access_token_minutes,
        refresh_token_days: auth_opts.refresh_token_days,
        password_work_factor: auth_opts.password_work_factor,
        store_timeout_seconds: auth_opts.store_timeout_seconds,
        rate_limit_max: rate_limit_opts.max,
        rate_limit_window_seconds: rate_limit_opts.window_seconds,
        trust_proxy_headers: rate_limit_opts.trust_proxy_headers,
        oauth_callback_url: oauth_opts.callback_url,
        github: oauth_opts.github,
        google: oauth_opts.google,
    }))
}
