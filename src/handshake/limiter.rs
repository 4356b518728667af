//! Per-identity failed-attempt limiting.
//!
//! Flow Overview:
//! 1) `check` before contacting the provider; a blocked identity is rejected locally.
//! 2) `record_failure` after the provider reports a wrong code.
//! 3) `reset` on success and, by policy, when a fresh code is sent.

use chrono::Utc;
use std::sync::Arc;

use super::error::StoreError;
use super::identity::Identity;
use super::models::AttemptRecord;
use super::store::AttemptStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptDecision {
    Allowed { attempts_used: u32 },
    Blocked { attempts_used: u32 },
}

#[derive(Clone)]
pub struct AttemptLimiter {
    store: Arc<dyn AttemptStore>,
    max_attempts: u32,
}

impl AttemptLimiter {
    pub fn new(store: Arc<dyn AttemptStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Failed attempts recorded against the current code.
    ///
    /// # Errors
    /// Returns an error if the attempt store fails.
    pub async fn attempts_used(&self, identity: &Identity) -> Result<u32, StoreError> {
        Ok(self
            .store
            .get(identity)
            .await?
            .map_or(0, |record| record.failed_count))
    }

    /// An identity is blocked once it has used up all of its attempts.
    ///
    /// # Errors
    /// Returns an error if the attempt store fails.
    pub async fn check(&self, identity: &Identity) -> Result<AttemptDecision, StoreError> {
        let attempts_used = self.attempts_used(identity).await?;
        if attempts_used >= self.max_attempts {
            Ok(AttemptDecision::Blocked { attempts_used })
        } else {
            Ok(AttemptDecision::Allowed { attempts_used })
        }
    }

    /// Count one more failure and return the new total.
    ///
    /// # Errors
    /// Returns an error if the attempt store fails.
    pub async fn record_failure(&self, identity: &Identity) -> Result<u32, StoreError> {
        let failed_count = self.attempts_used(identity).await?.saturating_add(1);
        self.store
            .put(AttemptRecord {
                identity: identity.clone(),
                failed_count,
                last_attempt_at: Utc::now(),
            })
            .await?;
        Ok(failed_count)
    }

    /// # Errors
    /// Returns an error if the attempt store fails.
    pub async fn reset(&self, identity: &Identity) -> Result<(), StoreError> {
        self.store.delete(identity).await
    }

    #[must_use]
    pub fn remaining(&self, attempts_used: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts_used)
    }
}
