//! Per-identity mutual exclusion.
//!
//! Each identity gets its own async mutex, created on demand and dropped once
//! no task holds or waits on it. The registry is split into shards so that
//! looking up a lock only briefly touches one shard, and the shard lock is
//! never held across an `.await`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::identity::Identity;

const SHARDS: usize = 32;

type Shard = Mutex<HashMap<Identity, Weak<AsyncMutex<()>>>>;

/// Guard proving the holder has exclusive access to one identity.
pub type IdentityGuard = OwnedMutexGuard<()>;

pub struct IdentityLocks {
    shards: Vec<Shard>,
}

impl IdentityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, identity: &Identity) -> &Shard {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        let index = usize::try_from(hasher.finish() % SHARDS as u64).unwrap_or(0);
        &self.shards[index]
    }

    fn entry(&self, identity: &Identity) -> Arc<AsyncMutex<()>> {
        let mut shard = self
            .shard(identity)
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(lock) = shard.get(identity).and_then(Weak::upgrade) {
            return lock;
        }

        // Drop entries whose mutex is gone before adding a new one.
        shard.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        shard.insert(identity.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive access to `identity`.
    pub async fn acquire(&self, identity: &Identity) -> IdentityGuard {
        self.entry(identity).lock_owned().await
    }

    /// Number of identities that currently have a live lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .values()
                    .filter(|weak| weak.strong_count() > 0)
                    .count()
            })
            .sum()
    }
}

impl Default for IdentityLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_identity_is_exclusive() {
        let locks = IdentityLocks::new();
        let identity = Identity::parse("+15551230000").unwrap();

        let guard = locks.acquire(&identity).await;
        let blocked = timeout(Duration::from_millis(50), locks.acquire(&identity)).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = timeout(Duration::from_millis(50), locks.acquire(&identity)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn distinct_identities_do_not_contend() {
        let locks = IdentityLocks::new();
        let alice = Identity::parse("+15551230000").unwrap();
        let bob = Identity::parse("+15551239999").unwrap();

        let _alice = locks.acquire(&alice).await;
        let bob_guard = timeout(Duration::from_millis(50), locks.acquire(&bob)).await;
        assert!(bob_guard.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_not_retained() {
        let locks = IdentityLocks::new();
        let identity = Identity::parse("+15551230000").unwrap();

        drop(locks.acquire(&identity).await);
        assert_eq!(locks.active(), 0);
    }
}
