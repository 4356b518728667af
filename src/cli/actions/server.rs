use crate::codegate;
use crate::handshake::{
    provider::HttpProvider, store::PgSessionStore, HandshakeConfig, HandshakeStores, Orchestrator,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub provider_url: Url,
    pub provider_api_key: SecretString,
    pub handshake: HandshakeConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the provider client cannot be built, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let provider = HttpProvider::new(
        args.provider_url,
        args.provider_api_key,
        args.handshake.provider_timeout(),
    )
    .context("Failed to build provider client")?;

    let stores = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;

            let sessions = PgSessionStore::new(pool);
            sessions
                .migrate()
                .await
                .context("Failed to apply session schema")?;

            HandshakeStores::with_sessions(Arc::new(sessions))
        }
        None => {
            warn!("no --dsn given, sessions are kept in memory and lost on restart");
            HandshakeStores::in_memory()
        }
    };

    let orchestrator = Orchestrator::new(args.handshake, Arc::new(provider), stores);

    codegate::new(args.port, Arc::new(orchestrator)).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "none (in-memory sessions)".to_string(), redact_dsn),
        ),
        ("provider_url", args.provider_url.to_string()),
        (
            "provider_timeout",
            format!("{}s", args.handshake.provider_timeout().as_secs()),
        ),
        ("max_attempts", args.handshake.max_attempts().to_string()),
        (
            "code_ttl_seconds",
            args.handshake.code_ttl_seconds().to_string(),
        ),
        (
            "reissue_on_expiry",
            args.handshake.reissue_on_expiry().to_string(),
        ),
        (
            "reset_attempts_on_resend",
            args.handshake.reset_attempts_on_resend().to_string(),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "codegate {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
