//! Maps parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{handshake, provider};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());

    let provider_opts = provider::Options::parse(matches)?;
    let handshake_opts = handshake::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        provider_url: provider_opts.url,
        provider_api_key: provider_opts.api_key,
        handshake: handshake_opts
            .config()
            .with_provider_timeout(provider_opts.timeout),
    }))
}
