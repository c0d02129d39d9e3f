//! Repository abstraction for work item persistence.
//!
//! `ItemRepository` hides the storage backend from the store. Records are
//! always written whole; there is no field-level update.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::item::{ItemId, ReviewStatus, WorkItem};

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Get an item, returning None if not found.
    async fn get(&self, id: &ItemId) -> Result<Option<WorkItem>, RepositoryError>;

    /// Replace the full record (upsert semantics).
    async fn put(&self, item: WorkItem) -> Result<(), RepositoryError>;

    /// Insert a record that must not exist yet.
    ///
    /// Returns `RepositoryError::AlreadyExists` if the id is taken.
    async fn insert_new(&self, item: WorkItem) -> Result<(), RepositoryError>;

    /// All items, optionally restricted to one status, oldest first.
    async fn list(&self, status: Option<ReviewStatus>) -> Result<Vec<WorkItem>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}
