//! In-memory stores.
//!
//! Pending handshakes and attempt records only live for the lifetime of the
//! process, so a restart drops every in-flight handshake. The session store
//! here is meant for tests and local runs without a database.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AttemptStore, PendingStore, SessionStore};
use crate::handshake::error::StoreError;
use crate::handshake::identity::Identity;
use crate::handshake::models::{AttemptRecord, PendingHandshake, SessionToken};

#[derive(Default)]
pub struct MemoryPendingStore {
    entries: RwLock<HashMap<Identity, PendingHandshake>>,
}

impl MemoryPendingStore {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PendingStore for MemoryPendingStore {
    async fn get(&self, identity: &Identity) -> Result<Option<PendingHandshake>, StoreError> {
        Ok(self.entries.read().await.get(identity).cloned())
    }

    async fn put(&self, pending: PendingHandshake) -> Result<(), StoreError> {
        let _ = self
            .entries
            .write()
            .await
            .insert(pending.identity.clone(), pending);
        Ok(())
    }

    async fn delete(&self, identity: &Identity) -> Result<(), StoreError> {
        let _ = self.entries.write().await.remove(identity);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    entries: RwLock<HashMap<Identity, AttemptRecord>>,
}

#[async_trait::async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn get(&self, identity: &Identity) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(self.entries.read().await.get(identity).cloned())
    }

    async fn put(&self, record: AttemptRecord) -> Result<(), StoreError> {
        let _ = self
            .entries
            .write()
            .await
            .insert(record.identity.clone(), record);
        Ok(())
    }

    async fn delete(&self, identity: &Identity) -> Result<(), StoreError> {
        let _ = self.entries.write().await.remove(identity);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<Identity, SessionToken>>,
}

impl MemorySessionStore {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn exists(&self, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(identity))
    }

    async fn get(&self, identity: &Identity) -> Result<Option<SessionToken>, StoreError> {
        Ok(self.entries.read().await.get(identity).cloned())
    }

    async fn insert(&self, session: SessionToken) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&session.identity) {
            return Ok(false);
        }
        entries.insert(session.identity.clone(), session);
        Ok(true)
    }

    async fn delete(&self, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(identity).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::identity::CodeHandle;
    use chrono::Utc;
    use secrecy::{ExposeSecret, SecretString};

    fn identity() -> Identity {
        Identity::parse("+15551230000").unwrap()
    }

    #[tokio::test]
    async fn pending_put_replaces_previous_handle() {
        let store = MemoryPendingStore::default();
        store
            .put(PendingHandshake::new(identity(), CodeHandle::new("h1")))
            .await
            .unwrap();
        store
            .put(PendingHandshake::new(identity(), CodeHandle::new("h2")))
            .await
            .unwrap();

        let pending = store.get(&identity()).await.unwrap().unwrap();
        assert_eq!(pending.code_handle, CodeHandle::new("h2"));
        assert_eq!(store.len().await, 1);

        store.delete(&identity()).await.unwrap();
        assert!(store.get(&identity()).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn attempt_records_round_trip() {
        let store = MemoryAttemptStore::default();
        assert!(store.get(&identity()).await.unwrap().is_none());

        store
            .put(AttemptRecord {
                identity: identity(),
                failed_count: 2,
                last_attempt_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(
            store.get(&identity()).await.unwrap().map(|r| r.failed_count),
            Some(2)
        );

        store.delete(&identity()).await.unwrap();
        assert!(store.get(&identity()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_insert_never_overwrites() {
        let store = MemorySessionStore::default();
        let first = SessionToken::new(identity(), SecretString::from("first"));
        let second = SessionToken::new(identity(), SecretString::from("second"));

        assert!(store.insert(first).await.unwrap());
        assert!(!store.insert(second).await.unwrap());

        let stored = store.get(&identity()).await.unwrap().unwrap();
        assert_eq!(stored.token.expose_secret(), "first");
        assert!(store.exists(&identity()).await.unwrap());

        assert!(store.delete(&identity()).await.unwrap());
        assert!(!store.delete(&identity()).await.unwrap());
        assert!(!store.exists(&identity()).await.unwrap());
    }
}
