//! Conflict taxonomy and error types.
//!
//! Every rejected operation surfaces as a `ReviewError` carrying a stable
//! `ErrorCode`. Callers branch on the code: conflicts mean the precondition
//! that made a decision valid no longer holds, so the caller must refetch
//! (or use the inline snapshot) instead of retrying the same request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::item::{ItemId, LockSnapshot, ReviewStatus, WorkItem};

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LockConflict,
    VersionConflict,
    AlreadyProcessed,
    NotFound,
    ValidationError,
    /// Transport failure. Raised only at the client boundary.
    NetworkError,
    StorageError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LockConflict => "LOCK_CONFLICT",
            Self::VersionConflict => "VERSION_CONFLICT",
            Self::AlreadyProcessed => "ALREADY_PROCESSED",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::StorageError => "STORAGE_ERROR",
        }
    }

    /// Lock, version and terminal-state conflicts.
    pub const fn is_conflict(self) -> bool {
        matches!(
            self,
            Self::LockConflict | Self::VersionConflict | Self::AlreadyProcessed
        )
    }

    /// Only transport failures may be retried as-is.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError)
    }

    /// The caller's view of the item is stale and must be reloaded.
    pub const fn requires_refetch(self) -> bool {
        matches!(
            self,
            Self::LockConflict | Self::VersionConflict | Self::AlreadyProcessed | Self::NotFound
        )
    }

    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::LockConflict => Some("Reload the item; acquire the lock again once it is free."),
            Self::VersionConflict => Some("Reload the item and review the latest version."),
            Self::AlreadyProcessed => Some("Nothing to do; the item is already decided."),
            Self::NotFound => None,
            Self::ValidationError => Some("Fix the request and submit again."),
            Self::NetworkError => Some("Retry shortly."),
            Self::StorageError => Some("Retry once. If persistent, check server logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a lease check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockConflictReason {
    /// Another reviewer holds an unexpired lease.
    HeldByOther(LockSnapshot),
    /// No lease exists for the item.
    NotHeld,
    /// The caller's lease ran out.
    Expired { expired_at: DateTime<Utc> },
    /// The presented token does not match the active lease.
    TokenMismatch,
}

fn describe_lock_conflict(item_id: &ItemId, reason: &LockConflictReason) -> String {
    match reason {
        LockConflictReason::HeldByOther(holder) => format!(
            "item {} is being reviewed by {} ({}) until {}",
            item_id,
            holder.owner_name,
            holder.owner_id,
            holder.expires_at.format("%H:%M:%S UTC")
        ),
        LockConflictReason::NotHeld => format!(
            "you do not hold a lock on item {}; acquire it before deciding",
            item_id
        ),
        LockConflictReason::Expired { expired_at } => format!(
            "your lock on item {} expired at {}; acquire it again and review the latest version",
            item_id,
            expired_at.format("%H:%M:%S UTC")
        ),
        LockConflictReason::TokenMismatch => format!(
            "your lock token for item {} is no longer valid; another reviewer may have taken over",
            item_id
        ),
    }
}

fn describe_version_conflict(item_id: &ItemId, expected: &u64, current: &WorkItem) -> String {
    format!(
        "item {} changed since you loaded it (you had version {}, it is now version {} and {})",
        item_id, expected, current.version, current.status
    )
}

fn describe_already_processed(item_id: &ItemId, current: &WorkItem) -> String {
    let verb = match current.status {
        ReviewStatus::Approved => "approved",
        ReviewStatus::Rejected => "rejected",
        ReviewStatus::ReviewPending => "decided",
    };
    format!("item {} was already {}; no further decision is possible", item_id, verb)
}

/// Storage backend failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    #[error("corrupt stored data: {what}")]
    Corruption { what: &'static str },
    #[error("item {0} already exists")]
    AlreadyExists(ItemId),
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }
}

/// Error returned by every core operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReviewError {
    #[error("{}", describe_lock_conflict(.item_id, .reason))]
    LockConflict {
        item_id: ItemId,
        reason: LockConflictReason,
    },
    #[error("{}", describe_version_conflict(.item_id, .expected, .current))]
    VersionConflict {
        item_id: ItemId,
        expected: u64,
        current: Box<WorkItem>,
    },
    #[error("{}", describe_already_processed(.item_id, .current))]
    AlreadyProcessed {
        item_id: ItemId,
        current: Box<WorkItem>,
    },
    #[error("item {item_id} does not exist")]
    NotFound { item_id: ItemId },
    #[error("invalid request: {message}")]
    Validation { message: String },
    #[error("could not reach the review service: {message}")]
    Network { message: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ReviewError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn lock_conflict(item_id: &ItemId, reason: LockConflictReason) -> Self {
        Self::LockConflict {
            item_id: item_id.clone(),
            reason,
        }
    }

    pub fn not_found(item_id: &ItemId) -> Self {
        Self::NotFound {
            item_id: item_id.clone(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LockConflict { .. } => ErrorCode::LockConflict,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::AlreadyProcessed { .. } => ErrorCode::AlreadyProcessed,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::Repository(_) => ErrorCode::StorageError,
        }
    }

    /// Current state of the item, when the conflict carries one.
    pub fn current_snapshot(&self) -> Option<&WorkItem> {
        match self {
            Self::VersionConflict { current, .. } | Self::AlreadyProcessed { current, .. } => {
                Some(current.as_ref())
            }
            _ => None,
        }
    }

    /// The reviewer currently holding the item, for lock conflicts.
    pub fn holder(&self) -> Option<&LockSnapshot> {
        match self {
            Self::LockConflict {
                reason: LockConflictReason::HeldByOther(holder),
                ..
            } => Some(holder),
            _ => None,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
            current_snapshot: self.current_snapshot().cloned(),
            holder: self.holder().cloned(),
        }
    }
}

/// Wire form of a `ReviewError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot: Option<WorkItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<LockSnapshot>,
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::doc_submission;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique_and_screaming() {
        let all = [
            ErrorCode::LockConflict,
            ErrorCode::VersionConflict,
            ErrorCode::AlreadyProcessed,
            ErrorCode::NotFound,
            ErrorCode::ValidationError,
            ErrorCode::NetworkError,
            ErrorCode::StorageError,
        ];
        let names: HashSet<_> = all.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), all.len());
        for code in all {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(!ErrorCode::VersionConflict.is_retryable());
        assert!(!ErrorCode::AlreadyProcessed.is_retryable());
        assert!(!ErrorCode::LockConflict.is_retryable());
        assert!(ErrorCode::VersionConflict.requires_refetch());
        assert!(!ErrorCode::ValidationError.requires_refetch());
    }

    #[test]
    fn test_lock_conflict_message_names_the_holder() {
        let err = ReviewError::lock_conflict(
            &ItemId::from("x"),
            LockConflictReason::HeldByOther(LockSnapshot {
                owner_id: "rev-a".to_string(),
                owner_name: "Alice".to_string(),
                expires_at: Utc::now(),
            }),
        );
        let message = err.to_string();
        assert!(message.contains("Alice"), "{}", message);
        assert!(message.contains("rev-a"), "{}", message);

        let payload = err.to_payload();
        assert_eq!(payload.code, ErrorCode::LockConflict);
        assert_eq!(payload.holder.unwrap().owner_name, "Alice");
        assert!(payload.current_snapshot.is_none());
    }

    #[test]
    fn test_version_conflict_carries_snapshot() {
        let mut item = crate::item::WorkItem::from_submission(doc_submission("d"), Utc::now())
            .unwrap();
        item.version = 2;
        item.status = ReviewStatus::Rejected;
        let err = ReviewError::VersionConflict {
            item_id: item.id.clone(),
            expected: 1,
            current: Box::new(item),
        };

        let message = err.to_string();
        assert!(message.contains("version 1"), "{}", message);
        assert!(message.contains("version 2"), "{}", message);

        let payload = err.to_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["code"], "VERSION_CONFLICT");
        assert_eq!(json["currentSnapshot"]["version"], 2);
    }

    #[test]
    fn test_already_processed_message_says_how() {
        let mut item = crate::item::WorkItem::from_submission(doc_submission("d"), Utc::now())
            .unwrap();
        item.status = ReviewStatus::Approved;
        let err = ReviewError::AlreadyProcessed {
            item_id: item.id.clone(),
            current: Box::new(item),
        };
        assert!(err.to_string().contains("already approved"));
    }

    #[test]
    fn test_repository_errors_map_to_storage_code() {
        let err: ReviewError = RepositoryError::storage("get", "disk on fire").into();
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert!(err.to_string().contains("disk on fire"));
    }
}
