use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_OAUTH_CALLBACK_URL: &str = "oauth-callback-url";
pub const ARG_GITHUB_CLIENT_ID: &str = "github-client-id";
pub const ARG_GITHUB_CLIENT_SECRET: &str = "github-client-secret";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub callback_url: String,
    pub github: Option<ClientCredentials>,
    pub google: Option<ClientCredentials>,
}

/// Both halves or neither; one without the other is a configuration mistake.
fn credentials(
    matches: &ArgMatches,
    id_arg: &str,
    secret_arg: &str,
) -> anyhow::Result<Option<ClientCredentials>> {
    let get_non_empty = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.trim().is_empty())
    };
    match (get_non_empty(id_arg), get_non_empty(secret_arg)) {
        (Some(client_id), Some(client_secret)) => Ok(Some(ClientCredentials {
            client_id,
            client_secret: SecretString::from(client_secret),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!("missing required argument: --{secret_arg}"),
        (None, Some(_)) => anyhow::bail!("missing required argument: --{id_arg}"),
    }
}

impl Options {
    /// Parse OAuth client arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a provider has a client id without a secret or vice versa.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            callback_url: matches
                .get_one::<String>(ARG_OAUTH_CALLBACK_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            github: credentials(matches, ARG_GITHUB_CLIENT_ID, ARG_GITHUB_CLIENT_SECRET)?,
            google: credentials(matches, ARG_GOOGLE_CLIENT_ID, ARG_GOOGLE_CLIENT_SECRET)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OAUTH_CALLBACK_URL)
                .long(ARG_OAUTH_CALLBACK_URL)
                .help("Base for provider callbacks; /<provider>/callback is appended")
                .env("TESSERA_OAUTH_CALLBACK_URL")
                .default_value("http://localhost:8080/api/v1/auth/oauth"),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_ID)
                .long(ARG_GITHUB_CLIENT_ID)
                .help("GitHub OAuth app client id")
                .env("TESSERA_GITHUB_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_SECRET)
                .long(ARG_GITHUB_CLIENT_SECRET)
                .help("GitHub OAuth app client secret")
                .env("TESSERA_GITHUB_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("TESSERA_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("TESSERA_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn with_cleared_oauth_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        temp_env::with_vars(
            [
                ("TESSERA_OAUTH_CALLBACK_URL", None::<&str>),
                ("TESSERA_GITHUB_CLIENT_ID", None),
                ("TESSERA_GITHUB_CLIENT_SECRET", None),
                ("TESSERA_GOOGLE_CLIENT_ID", None),
                ("TESSERA_GOOGLE_CLIENT_SECRET", None),
            ],
            f,
        )
    }

    #[test]
    fn no_providers_by_default() {
        with_cleared_oauth_env(|| {
            let matches = with_args(Command::new("tessera")).get_matches_from(vec!["tessera"]);
            let options = Options::parse(&matches);
            assert!(options.is_ok());
            if let Ok(options) = options {
                assert_eq!(options.callback_url, "http://localhost:8080/api/v1/auth/oauth");
                assert!(options.github.is_none());
                assert!(options.google.is_none());
            }
        });
    }

    #[test]
    fn github_from_env_google_from_flags() {
        temp_env::with_vars(
            [
                ("TESSERA_GITHUB_CLIENT_ID", Some("gh-id")),
                ("TESSERA_GITHUB_CLIENT_SECRET", Some("gh-secret")),
                ("TESSERA_GOOGLE_CLIENT_ID", None),
                ("TESSERA_GOOGLE_CLIENT_SECRET", None),
            ],
            || {
                let matches = with_args(Command::new("tessera")).get_matches_from(vec![
                    "tessera",
                    "--google-client-id",
                    "g-id",
                    "--google-client-secret",
                    "g-secret",
                    "--oauth-callback-url",
                    "https://api.tessera.dev/api/v1/auth/oauth/",
                ]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert_eq!(
                        options.callback_url,
                        "https://api.tessera.dev/api/v1/auth/oauth"
                    );
                    let github = options.github.as_ref().map(|c| c.client_id.as_str());
                    assert_eq!(github, Some("gh-id"));
                    let google_secret = options
                        .google
                        .as_ref()
                        .map(|c| c.client_secret.expose_secret().to_string());
                    assert_eq!(google_secret.as_deref(), Some("g-secret"));
                }
            },
        );
    }

    #[test]
    fn half_configured_provider_fails() {
        with_cleared_oauth_env(|| {
            let matches = with_args(Command::new("tessera"))
                .get_matches_from(vec!["tessera", "--github-client-id", "gh-id"]);
            let result = Options::parse(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(
                    err.to_string()
                        .contains("missing required argument: --github-client-secret")
                );
            }
        });
    }
}
