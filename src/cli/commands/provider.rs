use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_PROVIDER_API_KEY: &str = "provider-api-key";
pub const ARG_PROVIDER_TIMEOUT_SECONDS: &str = "provider-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: Url,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl Options {
    /// Parse provider gateway arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the URL or API key is missing or malformed.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = match matches.get_one::<String>(ARG_PROVIDER_URL) {
            Some(value) if !value.trim().is_empty() => Url::parse(value.trim())
                .map_err(|err| anyhow::anyhow!("invalid --{ARG_PROVIDER_URL}: {err}"))?,
            _ => anyhow::bail!("missing required argument: --{ARG_PROVIDER_URL}"),
        };

        let api_key = match matches.get_one::<String>(ARG_PROVIDER_API_KEY) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.trim().to_string()),
            _ => anyhow::bail!("missing required argument: --{ARG_PROVIDER_API_KEY}"),
        };

        let timeout = matches
            .get_one::<u64>(ARG_PROVIDER_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(15);

        Ok(Self {
            url,
            api_key,
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help("Base URL of the identity provider gateway")
                .env("CODEGATE_PROVIDER_URL"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_API_KEY)
                .long(ARG_PROVIDER_API_KEY)
                .help("API key sent to the provider gateway as a bearer token")
                .env("CODEGATE_PROVIDER_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT_SECONDS)
                .long(ARG_PROVIDER_TIMEOUT_SECONDS)
                .help("Upper bound for every provider call, in seconds")
                .env("CODEGATE_PROVIDER_TIMEOUT_SECONDS")
                .default_value("15")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
