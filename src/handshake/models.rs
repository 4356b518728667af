use chrono::{DateTime, Utc};
use secrecy::SecretString;

use super::identity::{CodeHandle, Identity};

/// The outstanding code request for an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingHandshake {
    pub identity: Identity,
    pub code_handle: CodeHandle,
    pub issued_at: DateTime<Utc>,
}

impl PendingHandshake {
    #[must_use]
    pub fn new(identity: Identity, code_handle: CodeHandle) -> Self {
        Self {
            identity,
            code_handle,
            issued_at: Utc::now(),
        }
    }

    /// Whether the provider-side code has outlived `ttl_seconds`.
    #[must_use]
    pub fn is_expired(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.issued_at).num_seconds() >= ttl_seconds
    }
}

/// Failed verification attempts against the current code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub identity: Identity,
    pub failed_count: u32,
    pub last_attempt_at: DateTime<Utc>,
}

/// The durable credential produced by a completed handshake.
#[derive(Clone, Debug)]
pub struct SessionToken {
    pub identity: Identity,
    pub token: SecretString,
    pub finalized_at: DateTime<Utc>,
}

impl SessionToken {
    #[must_use]
    pub fn new(identity: Identity, token: SecretString) -> Self {
        Self {
            identity,
            token,
            finalized_at: Utc::now(),
        }
    }
}
