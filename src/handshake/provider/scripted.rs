//! Deterministic in-process provider for tests and local runs.

use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{IdentityProvider, ProviderConnection, VerifyResponse};
use crate::handshake::error::ProviderError;
use crate::handshake::identity::{CodeHandle, Identity};

const DEFAULT_CODE: &str = "12345";

/// Counters of every call that reached the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProviderCalls {
    pub opens: usize,
    pub closes: usize,
    pub code_requests: usize,
    pub verifies: usize,
}

#[derive(Default)]
struct Script {
    codes: HashMap<Identity, String>,
    secondary: HashMap<Identity, String>,
    expire_next_verify: bool,
    fail_next_open: Option<ProviderError>,
    fail_next_request: Option<ProviderError>,
    fail_next_verify: Option<ProviderError>,
    delay: Option<Duration>,
    close_delay: Option<Duration>,
    issued: usize,
    calls: ProviderCalls,
}

/// A provider whose answers are set up ahead of time.
///
/// Every identity accepts `12345` unless `set_code` says otherwise. Handles are
/// `handle-1`, `handle-2`, ... in issue order. A wrong secondary secret is
/// answered like a wrong code.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_code(&self, identity: &Identity, code: &str) {
        self.script().codes.insert(identity.clone(), code.to_string());
    }

    /// Require `secret` after a correct code for `identity`.
    pub fn require_secondary(&self, identity: &Identity, secret: &str) {
        self.script()
            .secondary
            .insert(identity.clone(), secret.to_string());
    }

    /// Answer the next verification with `ExpiredCode`.
    pub fn expire_next_verify(&self) {
        self.script().expire_next_verify = true;
    }

    pub fn fail_next_open(&self, err: ProviderError) {
        self.script().fail_next_open = Some(err);
    }

    pub fn fail_next_request(&self, err: ProviderError) {
        self.script().fail_next_request = Some(err);
    }

    pub fn fail_next_verify(&self, err: ProviderError) {
        self.script().fail_next_verify = Some(err);
    }

    /// Delay every code request and verification by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.script().delay = Some(delay);
    }

    /// Delay every connection close by `delay`.
    pub fn set_close_delay(&self, delay: Duration) {
        self.script().close_delay = Some(delay);
    }

    #[must_use]
    pub fn calls(&self) -> ProviderCalls {
        self.script().calls
    }

    async fn pause(&self) {
        let delay = self.script().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn open(&self) -> Result<Box<dyn ProviderConnection>, ProviderError> {
        let mut script = self.script();
        if let Some(err) = script.fail_next_open.take() {
            return Err(err);
        }
        script.calls.opens += 1;
        Ok(Box::new(ScriptedConnection {
            provider: self.clone(),
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    provider: ScriptedProvider,
    closed: bool,
}

#[async_trait::async_trait]
impl ProviderConnection for ScriptedConnection {
    async fn request_code(&mut self, _identity: &Identity) -> Result<CodeHandle, ProviderError> {
        self.provider.script().calls.code_requests += 1;
        self.provider.pause().await;

        let mut script = self.provider.script();
        if let Some(err) = script.fail_next_request.take() {
            return Err(err);
        }
        script.issued += 1;
        Ok(CodeHandle::new(format!("handle-{}", script.issued)))
    }

    async fn verify(
        &mut self,
        identity: &Identity,
        code: &str,
        _handle: &CodeHandle,
        secondary_secret: Option<&SecretString>,
    ) -> VerifyResponse {
        use secrecy::ExposeSecret;

        self.provider.script().calls.verifies += 1;
        self.provider.pause().await;

        let mut script = self.provider.script();
        if let Some(err) = script.fail_next_verify.take() {
            return VerifyResponse::Failed(err);
        }
        if std::mem::take(&mut script.expire_next_verify) {
            return VerifyResponse::ExpiredCode;
        }

        let expected = script
            .codes
            .get(identity)
            .map_or(DEFAULT_CODE, String::as_str);
        if code != expected {
            return VerifyResponse::InvalidCode;
        }

        if let Some(required) = script.secondary.get(identity) {
            match secondary_secret {
                None => return VerifyResponse::NeedsSecondary,
                Some(secret) if secret.expose_secret() != required => {
                    return VerifyResponse::InvalidCode;
                }
                Some(_) => {}
            }
        }

        VerifyResponse::Authorized(SecretString::from(format!(
            "session-{}-{}",
            identity.as_str().trim_start_matches('+'),
            script.calls.verifies
        )))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        let delay = self.provider.script().close_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.closed = true;
        self.provider.script().calls.closes += 1;
    }
}
