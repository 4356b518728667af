use clap::{builder::BoolishValueParser, Arg, ArgMatches, Command};

use crate::handshake::HandshakeConfig;

pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_REISSUE_ON_EXPIRY: &str = "reissue-on-expiry";
pub const ARG_RESET_ATTEMPTS_ON_RESEND: &str = "reset-attempts-on-resend";

#[derive(Debug, Clone)]
pub struct Options {
    pub max_attempts: u32,
    pub code_ttl_seconds: i64,
    pub reissue_on_expiry: bool,
    pub reset_attempts_on_resend: bool,
}

impl Options {
    /// Parse handshake tunables from matches, falling back to
    /// [`HandshakeConfig`] defaults.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let defaults = HandshakeConfig::new();
        let flag = |id: &str, default: bool| matches.get_one::<bool>(id).copied().unwrap_or(default);

        Self {
            max_attempts: matches
                .get_one::<u32>(ARG_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(defaults.max_attempts()),
            code_ttl_seconds: matches
                .get_one::<i64>(ARG_CODE_TTL_SECONDS)
                .copied()
                .unwrap_or(defaults.code_ttl_seconds()),
            reissue_on_expiry: flag(ARG_REISSUE_ON_EXPIRY, defaults.reissue_on_expiry()),
            reset_attempts_on_resend: flag(
                ARG_RESET_ATTEMPTS_ON_RESEND,
                defaults.reset_attempts_on_resend(),
            ),
        }
    }

    #[must_use]
    pub fn config(&self) -> HandshakeConfig {
        HandshakeConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_code_ttl_seconds(self.code_ttl_seconds)
            .with_reissue_on_expiry(self.reissue_on_expiry)
            .with_reset_attempts_on_resend(self.reset_attempts_on_resend)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Wrong codes allowed before a new code must be requested")
                .env("CODEGATE_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("Seconds a sent code blocks another code request")
                .env("CODEGATE_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REISSUE_ON_EXPIRY)
                .long(ARG_REISSUE_ON_EXPIRY)
                .help("Send a replacement code when the provider reports an expired code")
                .env("CODEGATE_REISSUE_ON_EXPIRY")
                .default_value("true")
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_RESET_ATTEMPTS_ON_RESEND)
                .long(ARG_RESET_ATTEMPTS_ON_RESEND)
                .help("Reset the failed attempt counter when a new code is sent")
                .env("CODEGATE_RESET_ATTEMPTS_ON_RESEND")
                .default_value("true")
                .value_parser(BoolishValueParser::new()),
        )
}
