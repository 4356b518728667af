//! Passive keyed stores for handshake state.
//!
//! Every store is keyed by [`Identity`] and writes are atomic per key. The
//! stores hold no business rules; the orchestrator decides every transition.

mod memory;
mod postgres;

pub use memory::{MemoryAttemptStore, MemoryPendingStore, MemorySessionStore};
pub use postgres::PgSessionStore;

use super::error::StoreError;
use super::identity::Identity;
use super::models::{AttemptRecord, PendingHandshake, SessionToken};

#[async_trait::async_trait]
pub trait PendingStore: Send + Sync {
    async fn get(&self, identity: &Identity) -> Result<Option<PendingHandshake>, StoreError>;
    /// Insert or replace the pending handshake for `pending.identity`.
    async fn put(&self, pending: PendingHandshake) -> Result<(), StoreError>;
    async fn delete(&self, identity: &Identity) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait AttemptStore: Send + Sync {
    async fn get(&self, identity: &Identity) -> Result<Option<AttemptRecord>, StoreError>;
    /// Insert or replace the attempt record for `record.identity`.
    async fn put(&self, record: AttemptRecord) -> Result<(), StoreError>;
    async fn delete(&self, identity: &Identity) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, identity: &Identity) -> Result<bool, StoreError>;
    async fn get(&self, identity: &Identity) -> Result<Option<SessionToken>, StoreError>;
    /// Store a session unless one already exists. Returns `false` when the
    /// identity was already finalized and nothing was written.
    async fn insert(&self, session: SessionToken) -> Result<bool, StoreError>;
    /// Remove a session. Returns `false` if there was none.
    async fn delete(&self, identity: &Identity) -> Result<bool, StoreError>;
}
