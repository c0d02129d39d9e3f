//! Concurrency core for a shared content-review queue.
//!
//! Reviewers take a time-bounded lease on a work item, then submit a
//! decision carrying the lease token and the version they last read. The
//! decision workflow validates both under a per-item critical section,
//! replaces the full record in the store, appends to the item's audit log
//! and, on final approval, notifies the publish sink.

pub mod api;
pub mod audit;
pub mod clock;
pub mod error;
pub mod item;
pub mod lock;
pub mod publish;
pub mod repository;
pub mod selection;
pub mod store;
pub mod workflow;

pub use api::{
    AcquireLockResponse, ApproveRequest, AttachMediaRequest, ItemPage, ItemResponse, ListFilter,
    PageInfo, RejectRequest, ReleaseLockRequest, ReleaseLockResponse, ReviewApi, StatusTab,
};
pub use audit::{AuditAction, AuditEvent, AuditLog, SYSTEM_ACTOR};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, ErrorPayload, LockConflictReason, RepositoryError, ReviewError};
pub use item::{
    ContentType, ItemId, LockHolder, LockSnapshot, ReviewStage, ReviewStatus, Submission,
    WorkItem,
};
pub use lock::{LockGrant, LockManager, LockToken, DEFAULT_LOCK_TTL};
pub use publish::{ChannelPublishSink, LogPublishSink, PublishNotice, PublishSink};
pub use repository::{InMemoryRepository, ItemRepository, SqliteRepository};
pub use selection::effective_selection;
pub use store::ReviewItemStore;
pub use workflow::{Decision, DecisionRequest, DecisionWorkflow};
