//! Append-only audit trail attached to each work item.
//!
//! The log exposes no way to edit or remove an entry once appended. Display
//! ordering is produced as a copy so the stored order is never touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Actor recorded on events the core emits on its own behalf.
pub const SYSTEM_ACTOR: &str = "system";

/// What happened to the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Submitted,
    MediaAttached,
    Approved,
    Rejected,
    Published,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Submitted => "SUBMITTED",
            Self::MediaAttached => "MEDIA_ATTACHED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(
        at: DateTime<Utc>,
        actor: impl Into<String>,
        action: AuditAction,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: format!("evt_{}", Uuid::new_v4().simple()),
            at,
            actor: actor.into(),
            action,
            detail,
        }
    }

    /// Event authored by the core itself rather than a reviewer.
    pub fn system(at: DateTime<Utc>, action: AuditAction, detail: Option<String>) -> Self {
        Self::new(at, SYSTEM_ACTOR, action, detail)
    }
}

/// Ordered, append-only list of audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<AuditEvent>);

impl AuditLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an event after every existing entry.
    pub fn append(&mut self, event: AuditEvent) {
        self.0.push(event);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.0
    }

    pub fn last(&self) -> Option<&AuditEvent> {
        self.0.last()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.0.iter().map(|e| e.action).collect()
    }

    pub fn contains(&self, action: AuditAction) -> bool {
        self.0.iter().any(|e| e.action == action)
    }

    /// Newest first. Events sharing a timestamp keep reverse insertion order.
    pub fn sorted_for_display(&self) -> Vec<AuditEvent> {
        let mut indexed: Vec<(usize, &AuditEvent)> = self.0.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.at.cmp(&a.at).then(ib.cmp(ia)));
        indexed.into_iter().map(|(_, e)| e.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut log = AuditLog::new();
        log.append(AuditEvent::new(at(0), "alice", AuditAction::Created, None));
        log.append(AuditEvent::new(at(1), "alice", AuditAction::Submitted, None));
        log.append(AuditEvent::new(at(2), "bob", AuditAction::Approved, None));

        assert_eq!(
            log.actions(),
            vec![
                AuditAction::Created,
                AuditAction::Submitted,
                AuditAction::Approved
            ]
        );
        assert_eq!(log.last().unwrap().actor, "bob");
    }

    #[test]
    fn test_sorted_for_display_does_not_reorder_stored_log() {
        let mut log = AuditLog::new();
        log.append(AuditEvent::new(at(5), "alice", AuditAction::Created, None));
        log.append(AuditEvent::new(at(5), "alice", AuditAction::Submitted, None));
        log.append(AuditEvent::system(at(9), AuditAction::Published, None));

        let display = log.sorted_for_display();
        assert_eq!(display[0].action, AuditAction::Published);
        // Same timestamp: the later insertion is shown first.
        assert_eq!(display[1].action, AuditAction::Submitted);
        assert_eq!(display[2].action, AuditAction::Created);

        assert_eq!(log.events()[0].action, AuditAction::Created);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = AuditEvent::new(at(0), "alice", AuditAction::Created, None);
        let b = AuditEvent::new(at(0), "alice", AuditAction::Created, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let mut log = AuditLog::new();
        log.append(AuditEvent::system(
            at(0),
            AuditAction::MediaAttached,
            Some("cdn://a".to_string()),
        ));
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["action"], "MEDIA_ATTACHED");
        assert_eq!(json[0]["actor"], SYSTEM_ACTOR);
    }
}
