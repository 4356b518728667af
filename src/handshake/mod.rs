//! Phone code handshake.
//!
//! A handshake moves one phone number from "no session" to "finalized":
//!
//! ```text
//! Idle -> CodeRequested -> AwaitingVerification -> (SecondaryRequired -> AwaitingVerification) -> Finalized
//! ```
//!
//! with `Expired` and `Blocked` as recoverable detours back to `CodeRequested`.
//!
//! ## Single Flight
//!
//! Operations on one identity are serialized through a per-identity lock;
//! different identities never wait on each other. A second code request for an
//! identity whose code is still usable fails with `InProgress`.
//!
//! ## Attempt Limit
//!
//! After `max_attempts` wrong codes (3 by default) further verifications are
//! rejected locally until a new code is requested. Sending a new code resets
//! the counter unless `reset_attempts_on_resend` is turned off.
//!
//! ## Storage
//!
//! Sessions are durable (Postgres). Pending handshakes and attempt counters
//! live in memory, so a restart drops every in-flight handshake and callers
//! see `NoPendingHandshake`.

mod config;
mod error;
mod identity;
mod limiter;
mod locks;
mod models;
mod orchestrator;
pub mod provider;
pub mod store;

pub use config::HandshakeConfig;
pub use error::{ErrorKind, HandshakeError, ProviderError, StoreError};
pub use identity::{CodeHandle, Identity};
pub use limiter::{AttemptDecision, AttemptLimiter};
pub use locks::{IdentityGuard, IdentityLocks};
pub use models::{AttemptRecord, PendingHandshake, SessionToken};
pub use orchestrator::{HandshakeStatus, HandshakeStores, Orchestrator, VerifyOutcome};
