//! Identity provider adapter contract.
//!
//! A provider hands out short-lived connections. Each handshake step opens one,
//! uses it, and closes it before returning; connections are never shared
//! between identities or kept across requests.

mod http;
mod scripted;

pub use http::HttpProvider;
pub use scripted::{ProviderCalls, ScriptedProvider};

use secrecy::SecretString;
use tracing::debug;

use super::error::ProviderError;
use super::identity::{CodeHandle, Identity};

/// Every way a provider can answer a verification.
#[derive(Debug)]
pub enum VerifyResponse {
    Authorized(SecretString),
    NeedsSecondary,
    InvalidCode,
    ExpiredCode,
    Failed(ProviderError),
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ProviderConnection>, ProviderError>;
}

#[async_trait::async_trait]
pub trait ProviderConnection: Send {
    async fn request_code(&mut self, identity: &Identity) -> Result<CodeHandle, ProviderError>;

    async fn verify(
        &mut self,
        identity: &Identity,
        code: &str,
        handle: &CodeHandle,
        secondary_secret: Option<&SecretString>,
    ) -> VerifyResponse;

    /// Release the connection. Must be safe to call on a broken connection.
    async fn close(&mut self);
}

/// Owns a connection for one step and makes sure it gets closed.
///
/// `close` should be awaited on every normal path. If the owning future is
/// dropped first (timeout, client disconnect), `Drop` hands the connection to
/// the runtime to be closed in the background.
pub struct ConnectionGuard {
    connection: Option<Box<dyn ProviderConnection>>,
}

impl ConnectionGuard {
    #[must_use]
    pub fn new(connection: Box<dyn ProviderConnection>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// # Errors
    /// Returns `ProviderError::Unavailable` if the connection was already closed.
    pub fn connection(&mut self) -> Result<&mut (dyn ProviderConnection + 'static), ProviderError> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| ProviderError::Unavailable("connection already closed".to_string()))
    }

    pub async fn close(mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!("closing abandoned provider connection");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { connection.close().await });
            }
        }
    }
}
