//! Time-leased reviewer locks, one per work item.
//!
//! A lease is logically gone once its `expires_at` passes; expiry is checked
//! lazily on `acquire` and `verify`, and `sweep_expired` exists for eager
//! cleanup. Acquisition never waits: a lease held by someone else is reported
//! as a conflict immediately.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LockConflictReason, ReviewError};
use crate::item::{ItemId, LockHolder, LockSnapshot};

/// Lease length used when no TTL is configured.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(90);

/// Proof of lease possession.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(pub String);

impl LockToken {
    pub fn generate() -> Self {
        Self(format!("lk_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens prove possession; keep them out of logs.
impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockToken(..)")
    }
}

impl From<String> for LockToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LockToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone)]
struct Lease {
    token: LockToken,
    holder: LockHolder,
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            owner_id: self.holder.owner_id.clone(),
            owner_name: self.holder.owner_name.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// A granted (or refreshed) lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    pub token: LockToken,
    pub holder: LockHolder,
    pub expires_at: DateTime<Utc>,
    /// The caller already held the lease and it was extended.
    pub refreshed: bool,
}

pub struct LockManager {
    leases: Mutex<HashMap<ItemId, Lease>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_LOCK_TTL)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_LOCK_TTL.as_secs() as i64));
        Self {
            leases: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ItemId, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grants a lease to `holder`, or extends the one it already holds.
    ///
    /// Fails with `LOCK_CONFLICT` only when a different holder has an
    /// unexpired lease.
    pub fn acquire(&self, item_id: &ItemId, holder: &LockHolder) -> Result<LockGrant, ReviewError> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let mut leases = self.table();

        if let Some(existing) = leases.get_mut(item_id) {
            if existing.is_active(now) {
                if existing.holder.owner_id != holder.owner_id {
                    debug!(
                        "Lease on {} refused to {}: held by {}",
                        item_id, holder, existing.holder
                    );
                    return Err(ReviewError::lock_conflict(
                        item_id,
                        LockConflictReason::HeldByOther(existing.snapshot()),
                    ));
                }

                existing.expires_at = expires_at;
                existing.holder.owner_name = holder.owner_name.clone();
                debug!("Lease on {} refreshed for {}", item_id, holder);
                return Ok(LockGrant {
                    token: existing.token.clone(),
                    holder: existing.holder.clone(),
                    expires_at,
                    refreshed: true,
                });
            }
        }

        let lease = Lease {
            token: LockToken::generate(),
            holder: holder.clone(),
            expires_at,
        };
        let grant = LockGrant {
            token: lease.token.clone(),
            holder: lease.holder.clone(),
            expires_at,
            refreshed: false,
        };
        leases.insert(item_id.clone(), lease);
        info!("Lease on {} granted to {} until {}", item_id, holder, expires_at);
        Ok(grant)
    }

    /// Checks that `token` names the active lease, returning its holder.
    pub fn verify(&self, item_id: &ItemId, token: &LockToken) -> Result<LockHolder, ReviewError> {
        let now = self.clock.now();
        let mut leases = self.table();

        let Some(lease) = leases.get(item_id) else {
            return Err(ReviewError::lock_conflict(item_id, LockConflictReason::NotHeld));
        };

        if !lease.is_active(now) {
            let expired_at = lease.expires_at;
            let owned = lease.token == *token;
            leases.remove(item_id);
            let reason = if owned {
                LockConflictReason::Expired { expired_at }
            } else {
                LockConflictReason::NotHeld
            };
            return Err(ReviewError::lock_conflict(item_id, reason));
        }

        if lease.token != *token {
            return Err(ReviewError::lock_conflict(
                item_id,
                LockConflictReason::TokenMismatch,
            ));
        }

        Ok(lease.holder.clone())
    }

    /// Drops the lease if `token` names it. A stale or foreign token is a no-op.
    pub fn release(&self, item_id: &ItemId, token: &LockToken) -> bool {
        let now = self.clock.now();
        let mut leases = self.table();

        if !leases.get(item_id).is_some_and(|lease| lease.token == *token) {
            return false;
        }

        match leases.remove(item_id) {
            Some(lease) if lease.is_active(now) => {
                info!("Lease on {} released by {}", item_id, lease.holder);
                true
            }
            _ => false,
        }
    }

    /// The active lease on `item_id`, if any.
    pub fn holder(&self, item_id: &ItemId) -> Option<LockSnapshot> {
        let now = self.clock.now();
        self.table()
            .get(item_id)
            .filter(|lease| lease.is_active(now))
            .map(Lease::snapshot)
    }

    /// Removes every expired lease. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut leases = self.table();
        let before = leases.len();
        leases.retain(|_, lease| lease.is_active(now));
        before - leases.len()
    }

    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.table().values().filter(|l| l.is_active(now)).count()
    }
}
