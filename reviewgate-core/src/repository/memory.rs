//! In-memory implementation of `ItemRepository`.
//!
//! All state is lost on restart.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ItemRepository;
use crate::error::RepositoryError;
use crate::item::{ItemId, ReviewStatus, WorkItem};

pub struct InMemoryRepository {
    items: RwLock<HashMap<ItemId, WorkItem>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_oldest_first(items: &mut [WorkItem]) {
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl ItemRepository for InMemoryRepository {
    async fn get(&self, id: &ItemId) -> Result<Option<WorkItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(id).cloned())
    }

    async fn put(&self, item: WorkItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn insert_new(&self, item: WorkItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        match items.entry(item.id.clone()) {
            Entry::Occupied(entry) => Err(RepositoryError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(item);
                Ok(())
            }
        }
    }

    async fn list(&self, status: Option<ReviewStatus>) -> Result<Vec<WorkItem>, RepositoryError> {
        let items = self.items.read().await;
        let mut selected: Vec<WorkItem> = items
            .values()
            .filter(|item| status.map_or(true, |s| item.status == s))
            .cloned()
            .collect();
        sort_oldest_first(&mut selected);
        Ok(selected)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.items.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::{doc_submission, video_submission};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let repo = InMemoryRepository::new();
        assert!(repo.get(&ItemId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_record() {
        let repo = InMemoryRepository::new();
        let mut item = WorkItem::from_submission(doc_submission("d-1"), Utc::now()).unwrap();
        repo.put(item.clone()).await.unwrap();

        item.version = 2;
        item.status = ReviewStatus::Approved;
        repo.put(item.clone()).await.unwrap();

        let stored = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, item);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_new_refuses_duplicates() {
        let repo = InMemoryRepository::new();
        let item = WorkItem::from_submission(doc_submission("d-1"), Utc::now()).unwrap();
        repo.insert_new(item.clone()).await.unwrap();

        let err = repo.insert_new(item).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(id) if id.as_str() == "d-1"));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_oldest_first() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let later = WorkItem::from_submission(video_submission("v-2", None), now).unwrap();
        let earlier =
            WorkItem::from_submission(video_submission("v-1", None), now - Duration::minutes(5))
                .unwrap();
        let mut done = WorkItem::from_submission(doc_submission("d-1"), now).unwrap();
        done.status = ReviewStatus::Rejected;

        repo.put(later).await.unwrap();
        repo.put(earlier).await.unwrap();
        repo.put(done).await.unwrap();

        let pending = repo.list(Some(ReviewStatus::ReviewPending)).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["v-1", "v-2"]);

        assert_eq!(repo.list(None).await.unwrap().len(), 3);
    }
}
