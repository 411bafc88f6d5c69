use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::auth::config::{DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW_SECONDS};

pub const ARG_RATE_LIMIT_MAX: &str = "rate-limit-max";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub max: u64,
    pub window_seconds: u64,
    /// Key limits on `x-forwarded-for` / `x-real-ip` instead of the socket peer.
    pub trust_proxy_headers: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            max: matches
                .get_one::<u64>(ARG_RATE_LIMIT_MAX)
                .copied()
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX),
            window_seconds: matches
                .get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX)
                .long(ARG_RATE_LIMIT_MAX)
                .help("Requests allowed per window on each auth route and client address")
                .env("TESSERA_RATE_LIMIT_MAX")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Fixed rate-limit window in seconds")
                .env("TESSERA_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Key rate limits on x-forwarded-for / x-real-ip; only behind a proxy that sets them")
                .env("TESSERA_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
