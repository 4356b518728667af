//! Handshake error taxonomy.
//!
//! Only conditions that stop a handshake step are errors. Normal branching
//! (wrong code, expired code, secondary secret required) is reported through
//! [`super::VerifyOutcome`] instead.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider call timed out")]
    Timeout,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("invalid phone number: {0}")]
    InvalidIdentity(String),
    #[error("a session already exists for this phone number")]
    AlreadyFinalized,
    #[error("a code was already sent and is still valid")]
    InProgress,
    #[error("no code has been requested for this phone number")]
    NoPendingHandshake,
    #[error("code handle does not match the latest code request")]
    HandleMismatch,
    #[error("too many failed attempts ({attempts_used}), request a new code")]
    TooManyAttempts { attempts_used: u32 },
    #[error("identity provider error: {0}")]
    ProviderTransient(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stable, machine-readable failure kinds exposed to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidIdentity,
    AlreadyFinalized,
    InProgress,
    NoPendingHandshake,
    HandleMismatch,
    TooManyAttempts,
    InvalidCode,
    ExpiredCode,
    ProviderTransient,
    Internal,
}

impl HandshakeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            Self::AlreadyFinalized => ErrorKind::AlreadyFinalized,
            Self::InProgress => ErrorKind::InProgress,
            Self::NoPendingHandshake => ErrorKind::NoPendingHandshake,
            Self::HandleMismatch => ErrorKind::HandleMismatch,
            Self::TooManyAttempts { .. } => ErrorKind::TooManyAttempts,
            Self::ProviderTransient(_) => ErrorKind::ProviderTransient,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_) | Self::Store(_))
    }
}
