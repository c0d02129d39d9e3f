//! Authoritative store of work items.
//!
//! The store is the only holder of the canonical `status`/`version` pair. It
//! also hands out per-item critical sections: every operation that reads,
//! checks and then writes an item (or its lease) runs while holding the guard
//! for that item id, so no other operation on the same item can interleave.
//! Different items never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{RepositoryError, ReviewError};
use crate::item::{ItemId, ReviewStatus, WorkItem};
use crate::repository::{InMemoryRepository, ItemRepository};

type SectionTable = Arc<Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>>;

/// Exclusive access to one item for the lifetime of the guard.
///
/// Dropping the last guard (with no other task waiting) removes the item's
/// entry from the section table, so the table only holds ids that are in use.
pub struct ItemGuard {
    item_id: ItemId,
    section: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    sections: SectionTable,
}

impl ItemGuard {
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        // Unlock while holding the table so no new waiter can clone the entry
        // between the unlock and the count check.
        drop(self.guard.take());
        // Remaining references: the table entry and `self.section`.
        if Arc::strong_count(&self.section) == 2 {
            let same_entry = sections
                .get(&self.item_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, &self.section));
            if same_entry {
                sections.remove(&self.item_id);
            }
        }
    }
}

pub struct ReviewItemStore {
    repository: Arc<dyn ItemRepository>,
    /// One mutex per item id currently held or awaited.
    sections: SectionTable,
}

impl ReviewItemStore {
    pub fn new(repository: Arc<dyn ItemRepository>) -> Self {
        Self {
            repository,
            sections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRepository::new()))
    }

    /// Enter the critical section for `item_id`.
    pub async fn lock_item(&self, item_id: &ItemId) -> ItemGuard {
        let section = {
            let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
            sections
                .entry(item_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = section.clone().lock_owned().await;
        ItemGuard {
            item_id: item_id.clone(),
            section,
            guard: Some(guard),
            sections: self.sections.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn section_count(&self) -> usize {
        self.sections.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn get(&self, item_id: &ItemId) -> Result<WorkItem, ReviewError> {
        self.repository
            .get(item_id)
            .await?
            .ok_or_else(|| ReviewError::not_found(item_id))
    }

    /// Replace the full record. Any display lock overlay is stripped first.
    pub async fn put(&self, item: WorkItem) -> Result<(), RepositoryError> {
        self.repository.put(item.with_lock(None)).await
    }

    /// Store a newly submitted item; duplicates are a validation error.
    pub async fn insert_new(&self, item: WorkItem) -> Result<(), ReviewError> {
        match self.repository.insert_new(item.with_lock(None)).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::AlreadyExists(id)) => Err(ReviewError::validation(format!(
                "an item with id {} already exists",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Items in `status` (or all) that satisfy `predicate`, oldest first.
    pub async fn list<P>(
        &self,
        status: Option<ReviewStatus>,
        predicate: P,
    ) -> Result<Vec<WorkItem>, RepositoryError>
    where
        P: Fn(&WorkItem) -> bool + Send,
    {
        let items = self.repository.list(status).await?;
        Ok(items.into_iter().filter(|item| predicate(item)).collect())
    }

    pub async fn count(&self) -> Result<usize, RepositoryError> {
        self.repository.count().await
    }
}
