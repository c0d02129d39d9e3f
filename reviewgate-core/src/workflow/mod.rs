//! Decision workflow.
//!
//! Runs a decision against one item as a single critical section:
//!
//! 1. enter the item's section,
//! 2. verify the caller's lease,
//! 3. load the item and run the pure [`decide`] transition,
//! 4. write the full record,
//! 5. run the resulting effects (publish notice, lease release).
//!
//! Any failed precondition returns before step 4, so a refused decision never
//! mutates the stored item.

mod decision;
mod effect;

pub use decision::{decide, Decision, Outcome};
pub use effect::{execute_effects, Effect, EffectContext};

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::ReviewError;
use crate::item::{ItemId, WorkItem};
use crate::lock::{LockManager, LockToken};
use crate::publish::PublishSink;
use crate::store::ReviewItemStore;

/// What the caller believes it is deciding on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    pub version: u64,
    pub lock_token: LockToken,
}

impl DecisionRequest {
    pub fn new(version: u64, lock_token: impl Into<LockToken>) -> Self {
        Self {
            version,
            lock_token: lock_token.into(),
        }
    }
}

pub struct DecisionWorkflow {
    store: Arc<ReviewItemStore>,
    locks: Arc<LockManager>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn PublishSink>,
}

impl DecisionWorkflow {
    pub fn new(
        store: Arc<ReviewItemStore>,
        locks: Arc<LockManager>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            publisher,
        }
    }

    pub async fn approve(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
    ) -> Result<WorkItem, ReviewError> {
        self.execute(item_id, request, Decision::Approve).await
    }

    pub async fn reject(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        reason: impl Into<String>,
    ) -> Result<WorkItem, ReviewError> {
        let decision = Decision::Reject {
            reason: reason.into(),
        };
        self.execute(item_id, request, decision).await
    }

    pub async fn attach_media(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        media_ref: impl Into<String>,
    ) -> Result<WorkItem, ReviewError> {
        let decision = Decision::AttachMedia {
            media_ref: media_ref.into(),
        };
        self.execute(item_id, request, decision).await
    }

    /// Run one decision. Returns the committed item with the current lease
    /// overlaid.
    pub async fn execute(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        decision: Decision,
    ) -> Result<WorkItem, ReviewError> {
        decision.validate()?;

        let _section = self.store.lock_item(item_id).await;

        let result = self.decide_and_commit(item_id, request, &decision).await;
        match result {
            Ok(outcome) => {
                info!(
                    "Accepted {} on {} (version {} -> {})",
                    decision.name(),
                    item_id,
                    request.version,
                    outcome.item.version
                );

                let ctx = EffectContext {
                    item_id,
                    lock_token: &request.lock_token,
                    locks: &self.locks,
                    publisher: self.publisher.as_ref(),
                };
                execute_effects(&ctx, outcome.effects);

                Ok(outcome.item.with_lock(self.locks.holder(item_id)))
            }
            Err(err) => {
                if err.code().is_conflict() {
                    warn!("Refused {} on {}: {}", decision.name(), item_id, err);
                } else if matches!(err, ReviewError::Repository(_)) {
                    error!("Failed to {} {}: {}", decision.name(), item_id, err);
                }
                Err(self.overlay_snapshot(item_id, err))
            }
        }
    }

    async fn decide_and_commit(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        decision: &Decision,
    ) -> Result<Outcome, ReviewError> {
        let actor = self.locks.verify(item_id, &request.lock_token)?;
        let current = self.store.get(item_id).await?;
        let outcome = decide(
            &current,
            request.version,
            decision,
            &actor,
            self.clock.now(),
        )?;
        self.store.put(outcome.item.clone()).await?;
        Ok(outcome)
    }

    /// Conflict snapshots carry the live lease, as any other read does.
    fn overlay_snapshot(&self, item_id: &ItemId, err: ReviewError) -> ReviewError {
        match err {
            ReviewError::VersionConflict {
                item_id: id,
                expected,
                current,
            } => ReviewError::VersionConflict {
                item_id: id,
                expected,
                current: Box::new(current.with_lock(self.locks.holder(item_id))),
            },
            ReviewError::AlreadyProcessed { item_id: id, current } => {
                ReviewError::AlreadyProcessed {
                    item_id: id,
                    current: Box::new(current.with_lock(self.locks.holder(item_id))),
                }
            }
            other => other,
        }
    }
}
