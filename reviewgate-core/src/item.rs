//! Work item types.
//!
//! A `WorkItem` is the unit under review. Its `status`/`version` pair is owned
//! by the store and changed only through the decision workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::error::ReviewError;

/// Opaque work item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    ReviewPending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    /// Terminal statuses accept no further decisions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::ReviewPending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReviewPending => "REVIEW_PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Video,
    PolicyDoc,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "VIDEO",
            Self::PolicyDoc => "POLICY_DOC",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which review pass an item is in.
///
/// Video content is first reviewed as a script (`FirstPass`) and only becomes
/// publishable once a media artifact is attached (`Final`). Documents are
/// always `Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStage {
    FirstPass,
    Final,
}

impl ReviewStage {
    pub fn for_content(content_type: ContentType, media_ref: Option<&str>) -> Self {
        match content_type {
            ContentType::PolicyDoc => Self::Final,
            ContentType::Video if media_ref.is_some() => Self::Final,
            ContentType::Video => Self::FirstPass,
        }
    }
}

/// Identity of a reviewer holding (or requesting) a lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub owner_id: String,
    pub owner_name: String,
}

impl LockHolder {
    pub fn new(owner_id: impl Into<String>, owner_name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
        }
    }
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.owner_name, self.owner_id)
    }
}

/// Display copy of an active lease. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSnapshot {
    pub owner_id: String,
    pub owner_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Upstream submission event that creates a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: ItemId,
    pub title: String,
    pub content_type: ContentType,
    pub submitted_by: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub doc_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: ItemId,
    pub title: String,
    pub content_type: ContentType,
    pub stage: ReviewStage,
    pub status: ReviewStatus,
    pub version: u64,
    pub submitted_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ref: Option<String>,
    /// Overlaid from the lock manager on reads; stored records keep this `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockSnapshot>,
    pub audit: AuditLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trims a reference and drops it if nothing is left.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl WorkItem {
    /// Builds a freshly submitted item at version 1 with its `CREATED` and
    /// `SUBMITTED` audit pair.
    pub fn from_submission(submission: Submission, now: DateTime<Utc>) -> Result<Self, ReviewError> {
        if submission.id.as_str().trim().is_empty() {
            return Err(ReviewError::validation("item id must not be blank"));
        }
        if submission.title.trim().is_empty() {
            return Err(ReviewError::validation("title must not be blank"));
        }
        if submission.submitted_by.trim().is_empty() {
            return Err(ReviewError::validation("submittedBy must not be blank"));
        }

        let media_ref = non_blank(submission.media_ref);
        let doc_ref = non_blank(submission.doc_ref);
        let stage = ReviewStage::for_content(submission.content_type, media_ref.as_deref());

        let mut audit = AuditLog::new();
        audit.append(AuditEvent::new(
            now,
            submission.submitted_by.clone(),
            AuditAction::Created,
            Some(format!("{} created", submission.content_type)),
        ));
        audit.append(AuditEvent::new(
            now,
            submission.submitted_by.clone(),
            AuditAction::Submitted,
            Some("submitted for review".to_string()),
        ));

        Ok(Self {
            id: submission.id,
            title: submission.title.trim().to_string(),
            content_type: submission.content_type,
            stage,
            status: ReviewStatus::ReviewPending,
            version: 1,
            submitted_by: submission.submitted_by,
            media_ref,
            doc_ref,
            lock: None,
            audit,
            reject_reason: None,
            approved_at: None,
            rejected_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::ReviewPending
    }

    /// Whether approving this item publishes it.
    pub fn is_publishable(&self) -> bool {
        match self.content_type {
            ContentType::PolicyDoc => true,
            ContentType::Video => self.stage == ReviewStage::Final && self.media_ref.is_some(),
        }
    }

    /// Reference handed to the publish sink: the media artifact for video,
    /// the document reference (or the item id) for documents.
    pub fn publish_ref(&self) -> String {
        match self.content_type {
            ContentType::Video => self.media_ref.clone().unwrap_or_default(),
            ContentType::PolicyDoc => self
                .doc_ref
                .clone()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }

    pub fn with_lock(mut self, lock: Option<LockSnapshot>) -> Self {
        self.lock = lock;
        self
    }

    /// Case-insensitive substring match over id, title and submitter.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.id.as_str().to_lowercase().contains(&needle)
            || self.title.to_lowercase().contains(&needle)
            || self.submitted_by.to_lowercase().contains(&needle)
    }
}
