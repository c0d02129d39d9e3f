//! Effects (side effects as data).
//!
//! `decide` returns effects instead of performing them; the workflow runs
//! them only after the new record has been committed to the store.

use tracing::warn;

use crate::item::ItemId;
use crate::lock::{LockManager, LockToken};
use crate::publish::{PublishNotice, PublishSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Notify the publish sink. The `PUBLISHED` audit event is already part
    /// of the committed record.
    Publish(PublishNotice),
    /// Drop the decider's lease.
    ReleaseLock,
}

/// What effects need to run.
pub struct EffectContext<'a> {
    pub item_id: &'a ItemId,
    pub lock_token: &'a LockToken,
    pub locks: &'a LockManager,
    pub publisher: &'a dyn PublishSink,
}

/// Run effects in order. Nothing here can undo the committed decision.
pub fn execute_effects(ctx: &EffectContext<'_>, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Publish(notice) => ctx.publisher.publish(notice),
            Effect::ReleaseLock => {
                if !ctx.locks.release(ctx.item_id, ctx.lock_token) {
                    warn!(
                        "Lease on {} was already gone after the decision; it will lapse on its own",
                        ctx.item_id
                    );
                }
            }
        }
    }
}
