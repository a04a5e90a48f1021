//! User delegation key cache
//!
//! Signing a SAS token needs a user delegation key from the account that owns
//! the container. Keys are requested for four hours, backdated by fifteen
//! minutes, and the cached copy is dropped fifteen minutes before the real key
//! expires so that clock skew against the provider never yields a dead key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::client::{BlobServiceClient, UserDelegationKey};
use crate::clock::Clock;
use crate::traits::StorageResult;

pub const DELEGATION_KEY_VALIDITY_MINUTES: i64 = 60 * 4;
pub const EXPIRATION_LEAD_MINUTES: i64 = 15;

/// Delegation key with the instant the cached copy stops being served
#[derive(Debug, Clone)]
pub struct CachedDelegationKey {
    pub key: UserDelegationKey,
    pub expires_at: DateTime<Utc>,
}

impl CachedDelegationKey {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type Slot = Arc<Mutex<Option<CachedDelegationKey>>>;

/// Per-account delegation key cache
///
/// Each account gets its own slot; a refresh holds only that slot's lock, so
/// concurrent callers for the same account share one fetch while other accounts
/// proceed.
pub struct DelegationKeyCache {
    clock: Arc<dyn Clock>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl DelegationKeyCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, account_name: &str) -> Slot {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(account_name) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots.entry(account_name.to_string()).or_default().clone()
    }

    /// Return a usable delegation key for the client's account, fetching a
    /// fresh one when none is cached or the cached one has expired.
    pub async fn get(&self, client: &dyn BlobServiceClient) -> StorageResult<UserDelegationKey> {
        let account_name = client.account_name();
        let slot = self.slot(account_name).await;
        let mut entry = slot.lock().await;

        let now = self.clock.now();
        if let Some(cached) = entry.as_ref() {
            if cached.is_usable_at(now) {
                return Ok(cached.key.clone());
            }
        }

        let lead = Duration::minutes(EXPIRATION_LEAD_MINUTES);
        let expires_on = now + Duration::minutes(DELEGATION_KEY_VALIDITY_MINUTES);
        let start = std::time::Instant::now();

        let key = client
            .get_user_delegation_key(now - lead, expires_on)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    account = %account_name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "User delegation key request failed"
                );
                e
            })?;

        let expires_at = expires_on - lead;
        *entry = Some(CachedDelegationKey {
            key: key.clone(),
            expires_at,
        });

        tracing::debug!(
            account = %account_name,
            expires_at = %expires_at,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Refreshed user delegation key"
        );

        Ok(key)
    }

    /// Current cache entry for an account, usable or not.
    pub async fn cached(&self, account_name: &str) -> Option<CachedDelegationKey> {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(account_name).cloned()
        }?;
        let entry = slot.lock().await;
        entry.clone()
    }
}
