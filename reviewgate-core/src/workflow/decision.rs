//! Pure decision transition.
//!
//! `decide` maps `(current item, decision) -> (next item, effects)` without
//! touching storage, locks or the clock. Lease verification happens before it
//! is called; the version and status checks happen here, in that order.

use chrono::{DateTime, Utc};

use super::effect::Effect;
use crate::audit::{AuditAction, AuditEvent};
use crate::error::ReviewError;
use crate::item::{ContentType, LockHolder, ReviewStage, ReviewStatus, WorkItem};
use crate::publish::PublishNotice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
    /// Attach the media artifact to a video still under review, moving it to
    /// its final stage. Not a terminal decision.
    AttachMedia { media_ref: String },
}

impl Decision {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
            Self::AttachMedia { .. } => "attach media",
        }
    }

    /// Checks that need neither the lease nor the stored item.
    pub fn validate(&self) -> Result<(), ReviewError> {
        match self {
            Self::Approve => Ok(()),
            Self::Reject { reason } if reason.trim().is_empty() => {
                Err(ReviewError::validation("a reason is required to reject an item"))
            }
            Self::AttachMedia { media_ref } if media_ref.trim().is_empty() => {
                Err(ReviewError::validation("mediaRef must not be blank"))
            }
            _ => Ok(()),
        }
    }
}

/// Result of an accepted decision.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub item: WorkItem,
    pub effects: Vec<Effect>,
}

pub fn decide(
    current: &WorkItem,
    expected_version: u64,
    decision: &Decision,
    actor: &LockHolder,
    now: DateTime<Utc>,
) -> Result<Outcome, ReviewError> {
    if current.version != expected_version {
        return Err(ReviewError::VersionConflict {
            item_id: current.id.clone(),
            expected: expected_version,
            current: Box::new(current.clone()),
        });
    }

    if current.status.is_terminal() {
        return Err(ReviewError::AlreadyProcessed {
            item_id: current.id.clone(),
            current: Box::new(current.clone()),
        });
    }

    let mut next = current.clone();
    next.lock = None;
    next.version = current.version + 1;
    next.updated_at = now;
    let mut effects = Vec::new();

    match decision {
        Decision::Approve => {
            next.status = ReviewStatus::Approved;
            next.approved_at.get_or_insert(now);
            next.audit.append(AuditEvent::new(
                now,
                actor.owner_id.clone(),
                AuditAction::Approved,
                Some(format!("approved by {}", actor.owner_name)),
            ));

            if next.is_publishable() {
                let published_at = *next.published_at.get_or_insert(now);
                let reference = next.publish_ref();
                next.audit.append(AuditEvent::system(
                    now,
                    AuditAction::Published,
                    Some(reference.clone()),
                ));
                effects.push(Effect::Publish(PublishNotice {
                    id: next.id.clone(),
                    media_or_doc_ref: reference,
                    published_at,
                }));
            }

            effects.push(Effect::ReleaseLock);
        }
        Decision::Reject { reason } => {
            let reason = reason.trim().to_string();
            next.status = ReviewStatus::Rejected;
            next.rejected_at.get_or_insert(now);
            next.reject_reason.get_or_insert_with(|| reason.clone());
            next.audit.append(AuditEvent::new(
                now,
                actor.owner_id.clone(),
                AuditAction::Rejected,
                Some(reason),
            ));
            effects.push(Effect::ReleaseLock);
        }
        Decision::AttachMedia { media_ref } => {
            if current.content_type != ContentType::Video {
                return Err(ReviewError::validation(format!(
                    "only VIDEO items accept media; {} is {}",
                    current.id, current.content_type
                )));
            }
            let media_ref = media_ref.trim().to_string();
            next.media_ref = Some(media_ref.clone());
            next.stage = ReviewStage::Final;
            next.audit.append(AuditEvent::new(
                now,
                actor.owner_id.clone(),
                AuditAction::MediaAttached,
                Some(media_ref),
            ));
        }
    }

    Ok(Outcome {
        item: next,
        effects,
    })
}
