//! Drives one identity through the code handshake.
//!
//! Flow Overview:
//! 1) `request_code`: reject finalized or in-flight identities, ask the provider
//!    for a code, remember its handle.
//! 2) `verify_code`: check the handle and the attempt budget locally, then let
//!    the provider judge the code and apply the resulting transition.
//! 3) On success the session is written and all in-flight state is dropped.
//!
//! Every operation holds the identity lock from its first read to its last
//! write. Store writes that follow a provider call run in a spawned task that
//! owns the lock, so a caller that goes away mid-request cannot leave a
//! half-applied transition behind.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn, Instrument};

use super::config::HandshakeConfig;
use super::error::{HandshakeError, ProviderError, StoreError};
use super::identity::{CodeHandle, Identity};
use super::limiter::{AttemptDecision, AttemptLimiter};
use super::locks::{IdentityGuard, IdentityLocks};
use super::models::{PendingHandshake, SessionToken};
use super::provider::{ConnectionGuard, IdentityProvider, VerifyResponse};
use super::store::{
    AttemptStore, MemoryAttemptStore, MemoryPendingStore, MemorySessionStore, PendingStore,
    SessionStore,
};

/// Result of a verification that reached a normal branch of the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Finalized {
        finalized_at: DateTime<Utc>,
    },
    /// The code was right but the account also needs its secondary secret.
    /// The same handle stays valid for the follow-up call.
    NeedsSecondary,
    InvalidCode {
        attempts_used: u32,
        attempts_remaining: u32,
    },
    /// The provider expired the code. `reissued` carries the handle of the
    /// replacement code when one was sent.
    Expired {
        reissued: Option<CodeHandle>,
    },
}

/// Read-only snapshot of where an identity stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeStatus {
    Idle,
    AwaitingVerification {
        issued_at: DateTime<Utc>,
        attempts_used: u32,
        expired: bool,
        blocked: bool,
    },
    Finalized {
        finalized_at: DateTime<Utc>,
    },
}

/// The stores an orchestrator works against.
#[derive(Clone)]
pub struct HandshakeStores {
    pub pending: Arc<dyn PendingStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl HandshakeStores {
    /// Keep in-flight state in memory and sessions in `sessions`.
    pub fn with_sessions(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            pending: Arc::new(MemoryPendingStore::default()),
            attempts: Arc::new(MemoryAttemptStore::default()),
            sessions,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_sessions(Arc::new(MemorySessionStore::default()))
    }
}

struct State {
    pending: Arc<dyn PendingStore>,
    limiter: AttemptLimiter,
    sessions: Arc<dyn SessionStore>,
}

pub struct Orchestrator {
    config: HandshakeConfig,
    provider: Arc<dyn IdentityProvider>,
    state: Arc<State>,
    locks: IdentityLocks,
}

impl Orchestrator {
    pub fn new(
        config: HandshakeConfig,
        provider: Arc<dyn IdentityProvider>,
        stores: HandshakeStores,
    ) -> Self {
        let limiter = AttemptLimiter::new(stores.attempts, config.max_attempts());
        Self {
            config,
            provider,
            state: Arc::new(State {
                pending: stores.pending,
                limiter,
                sessions: stores.sessions,
            }),
            locks: IdentityLocks::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Send a fresh code to `identity`.
    ///
    /// # Errors
    /// - `AlreadyFinalized` if the identity already has a session.
    /// - `InProgress` if a code was sent, has not expired, and still has attempts left.
    /// - `ProviderTransient` if the provider fails; nothing is stored in that case.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn request_code(&self, identity: &Identity) -> Result<CodeHandle, HandshakeError> {
        let guard = self.locks.acquire(identity).await;
        self.ensure_not_finalized(identity).await?;

        if let Some(pending) = self.state.pending.get(identity).await? {
            if self.is_live(&pending).await? {
                debug!("code already in flight");
                return Err(HandshakeError::InProgress);
            }
            debug!("replacing stale code request");
        }

        // A new code always lifts a block, whatever the resend policy.
        let blocked = matches!(
            self.state.limiter.check(identity).await?,
            AttemptDecision::Blocked { .. }
        );
        let handle = self.send_code(identity).await?;
        let reset_attempts = blocked || self.config.reset_attempts_on_resend();
        self.store_issued(guard, identity, handle, reset_attempts)
            .await
    }

    /// Check `code` for the request identified by `handle`.
    ///
    /// # Errors
    /// - `AlreadyFinalized`, `NoPendingHandshake`, `HandleMismatch` and
    ///   `TooManyAttempts` are decided locally without contacting the provider.
    /// - `ProviderTransient` if the provider fails; nothing is mutated.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn verify_code(
        &self,
        identity: &Identity,
        code: &str,
        handle: &CodeHandle,
        secondary_secret: Option<&SecretString>,
    ) -> Result<VerifyOutcome, HandshakeError> {
        let guard = self.locks.acquire(identity).await;
        self.ensure_not_finalized(identity).await?;

        let pending = self
            .state
            .pending
            .get(identity)
            .await?
            .ok_or(HandshakeError::NoPendingHandshake)?;

        if pending.code_handle != *handle {
            warn!("verification against a stale code handle");
            return Err(HandshakeError::HandleMismatch);
        }

        if let AttemptDecision::Blocked { attempts_used } =
            self.state.limiter.check(identity).await?
        {
            debug!(attempts_used, "attempt budget exhausted");
            return Err(HandshakeError::TooManyAttempts { attempts_used });
        }

        match self
            .check_code(identity, code, handle, secondary_secret)
            .await
        {
            VerifyResponse::Authorized(token) => {
                let session = SessionToken::new(identity.clone(), token);
                let finalized_at = session.finalized_at;
                let identity = identity.clone();

                self.commit(guard, move |state| async move {
                    if !state.sessions.insert(session).await? {
                        return Err(HandshakeError::AlreadyFinalized);
                    }
                    state.pending.delete(&identity).await?;
                    state.limiter.reset(&identity).await?;
                    info!("handshake finalized");
                    Ok::<_, HandshakeError>(VerifyOutcome::Finalized { finalized_at })
                })
                .await
            }
            VerifyResponse::NeedsSecondary => {
                info!("secondary secret required");
                Ok(VerifyOutcome::NeedsSecondary)
            }
            VerifyResponse::InvalidCode => {
                let identity = identity.clone();
                self.commit(guard, move |state| async move {
                    let attempts_used = state.limiter.record_failure(&identity).await?;
                    info!(attempts_used, "invalid code");
                    Ok::<_, HandshakeError>(VerifyOutcome::InvalidCode {
                        attempts_used,
                        attempts_remaining: state.limiter.remaining(attempts_used),
                    })
                })
                .await
            }
            VerifyResponse::ExpiredCode => self.recover_expired(guard, identity).await,
            VerifyResponse::Failed(err) => {
                warn!("provider failed during verification: {err}");
                Err(HandshakeError::ProviderTransient(err))
            }
        }
    }

    /// Drop the in-flight handshake so the identity can start over.
    ///
    /// # Errors
    /// Returns `AlreadyFinalized` for finalized identities, or a store error.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn cancel(&self, identity: &Identity) -> Result<(), HandshakeError> {
        let guard = self.locks.acquire(identity).await;
        self.ensure_not_finalized(identity).await?;

        let identity = identity.clone();
        self.commit(guard, move |state| async move {
            clear_in_flight(&state, &identity).await?;
            info!("handshake cancelled");
            Ok::<_, HandshakeError>(())
        })
        .await
    }

    /// # Errors
    /// Returns an error if a store read fails.
    pub async fn status(&self, identity: &Identity) -> Result<HandshakeStatus, HandshakeError> {
        let _guard = self.locks.acquire(identity).await;

        if let Some(session) = self.state.sessions.get(identity).await? {
            return Ok(HandshakeStatus::Finalized {
                finalized_at: session.finalized_at,
            });
        }

        let Some(pending) = self.state.pending.get(identity).await? else {
            return Ok(HandshakeStatus::Idle);
        };

        let decision = self.state.limiter.check(identity).await?;
        let (attempts_used, blocked) = match decision {
            AttemptDecision::Allowed { attempts_used } => (attempts_used, false),
            AttemptDecision::Blocked { attempts_used } => (attempts_used, true),
        };

        Ok(HandshakeStatus::AwaitingVerification {
            issued_at: pending.issued_at,
            attempts_used,
            expired: pending.is_expired(self.config.code_ttl_seconds(), Utc::now()),
            blocked,
        })
    }

    /// Delete the stored session, letting the identity go through the
    /// handshake again. Returns `false` if there was no session.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn revoke_session(&self, identity: &Identity) -> Result<bool, HandshakeError> {
        let guard = self.locks.acquire(identity).await;
        let identity = identity.clone();

        self.commit(guard, move |state| async move {
            let removed = state.sessions.delete(&identity).await?;
            clear_in_flight(&state, &identity).await?;
            if removed {
                info!("session revoked");
            }
            Ok::<_, HandshakeError>(removed)
        })
        .await
    }

    async fn ensure_not_finalized(&self, identity: &Identity) -> Result<(), HandshakeError> {
        if self.state.sessions.exists(identity).await? {
            debug!("identity already finalized");
            return Err(HandshakeError::AlreadyFinalized);
        }
        Ok(())
    }

    /// A pending handshake blocks a new code while its code can still be used.
    async fn is_live(&self, pending: &PendingHandshake) -> Result<bool, StoreError> {
        if pending.is_expired(self.config.code_ttl_seconds(), Utc::now()) {
            return Ok(false);
        }
        let decision = self.state.limiter.check(&pending.identity).await?;
        Ok(matches!(decision, AttemptDecision::Allowed { .. }))
    }

    async fn recover_expired(
        &self,
        guard: IdentityGuard,
        identity: &Identity,
    ) -> Result<VerifyOutcome, HandshakeError> {
        if !self.config.reissue_on_expiry() {
            let identity = identity.clone();
            return self
                .commit(guard, move |state| async move {
                    clear_in_flight(&state, &identity).await?;
                    info!("code expired");
                    Ok::<_, HandshakeError>(VerifyOutcome::Expired { reissued: None })
                })
                .await;
        }

        match self.send_code(identity).await {
            Ok(handle) => {
                let reissued = self
                    .store_issued(guard, identity, handle, true)
                    .await?;
                info!("code expired, replacement sent");
                Ok(VerifyOutcome::Expired {
                    reissued: Some(reissued),
                })
            }
            Err(err) => {
                let identity = identity.clone();
                self.commit(guard, move |state| async move {
                    clear_in_flight(&state, &identity).await?;
                    Err::<VerifyOutcome, _>(HandshakeError::ProviderTransient(err))
                })
                .await
            }
        }
    }

    async fn store_issued(
        &self,
        guard: IdentityGuard,
        identity: &Identity,
        handle: CodeHandle,
        reset_attempts: bool,
    ) -> Result<CodeHandle, HandshakeError> {
        let pending = PendingHandshake::new(identity.clone(), handle.clone());
        self.commit(guard, move |state| async move {
            let identity = pending.identity.clone();
            state.pending.put(pending).await?;
            if reset_attempts {
                state.limiter.reset(&identity).await?;
            }
            info!("verification code sent");
            Ok::<_, HandshakeError>(handle)
        })
        .await
    }

    /// Apply store writes while holding `guard`, detached from the caller.
    async fn commit<F, Fut, T>(&self, guard: IdentityGuard, work: F) -> Result<T, HandshakeError>
    where
        F: FnOnce(Arc<State>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, HandshakeError>> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(
            async move {
                let result = work(state).await;
                drop(guard);
                result
            }
            .in_current_span(),
        );

        task.await.map_err(|err| {
            HandshakeError::Store(StoreError::Backend(format!("commit task failed: {err}")))
        })?
    }

    /// One provider step: open, request a code, close.
    async fn send_code(&self, identity: &Identity) -> Result<CodeHandle, ProviderError> {
        let limit = self.config.provider_timeout();
        let mut connection = self.open_connection().await?;

        let result = match connection.connection() {
            Ok(conn) => timeout(limit, conn.request_code(identity))
                .await
                .unwrap_or(Err(ProviderError::Timeout)),
            Err(err) => Err(err),
        };

        close_within(limit, connection).await;
        if let Err(err) = &result {
            warn!("provider failed to send code: {err}");
        }
        result
    }

    /// One provider step: open, verify, close.
    async fn check_code(
        &self,
        identity: &Identity,
        code: &str,
        handle: &CodeHandle,
        secondary_secret: Option<&SecretString>,
    ) -> VerifyResponse {
        let limit = self.config.provider_timeout();
        let mut connection = match self.open_connection().await {
            Ok(connection) => connection,
            Err(err) => return VerifyResponse::Failed(err),
        };

        let response = match connection.connection() {
            Ok(conn) => timeout(limit, conn.verify(identity, code, handle, secondary_secret))
                .await
                .unwrap_or(VerifyResponse::Failed(ProviderError::Timeout)),
            Err(err) => VerifyResponse::Failed(err),
        };

        close_within(limit, connection).await;
        response
    }

    async fn open_connection(&self) -> Result<ConnectionGuard, ProviderError> {
        let connection = timeout(self.config.provider_timeout(), self.provider.open())
            .await
            .map_err(|_| ProviderError::Timeout)??;
        Ok(ConnectionGuard::new(connection))
    }
}

async fn close_within(limit: Duration, connection: ConnectionGuard) {
    if timeout(limit, connection.close()).await.is_err() {
        warn!("provider connection close timed out after {limit:?}");
    }
}

async fn clear_in_flight(state: &State, identity: &Identity) -> Result<(), HandshakeError> {
    state.pending.delete(identity).await?;
    state.limiter.reset(identity).await?;
    Ok(())
}
