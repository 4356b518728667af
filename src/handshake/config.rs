use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 15;

/// Tunables for the handshake orchestrator.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    max_attempts: u32,
    code_ttl_seconds: i64,
    provider_timeout: Duration,
    reissue_on_expiry: bool,
    reset_attempts_on_resend: bool,
}

impl HandshakeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECONDS),
            reissue_on_expiry: true,
            reset_attempts_on_resend: true,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reissue_on_expiry(mut self, enabled: bool) -> Self {
        self.reissue_on_expiry = enabled;
        self
    }

    #[must_use]
    pub fn with_reset_attempts_on_resend(mut self, enabled: bool) -> Self {
        self.reset_attempts_on_resend = enabled;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// How long a sent code is considered live for single-flight purposes.
    #[must_use]
    pub fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    #[must_use]
    pub fn reissue_on_expiry(&self) -> bool {
        self.reissue_on_expiry
    }

    #[must_use]
    pub fn reset_attempts_on_resend(&self) -> bool {
        self.reset_attempts_on_resend
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_config_defaults_and_overrides() {
        let config = HandshakeConfig::new();

        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.code_ttl_seconds(), DEFAULT_CODE_TTL_SECONDS);
        assert_eq!(
            config.provider_timeout(),
            Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECONDS)
        );
        assert!(config.reissue_on_expiry());
        assert!(config.reset_attempts_on_resend());

        let config = config
            .with_max_attempts(5)
            .with_code_ttl_seconds(60)
            .with_provider_timeout(Duration::from_millis(250))
            .with_reissue_on_expiry(false)
            .with_reset_attempts_on_resend(false);

        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.code_ttl_seconds(), 60);
        assert_eq!(config.provider_timeout(), Duration::from_millis(250));
        assert!(!config.reissue_on_expiry());
        assert!(!config.reset_attempts_on_resend());
    }

    #[test]
    fn max_attempts_never_zero() {
        assert_eq!(HandshakeConfig::new().with_max_attempts(0).max_attempts(), 1);
    }
}
