//! Request/response surface of the review core.
//!
//! `ReviewApi` is what the HTTP server exposes. Every read overlays the live
//! lease from the lock manager; every lease or decision operation runs inside
//! the item's critical section.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::ReviewError;
use crate::item::{ContentType, ItemId, LockHolder, ReviewStatus, Submission, WorkItem};
use crate::lock::{LockManager, LockToken};
use crate::publish::PublishSink;
use crate::selection::effective_selection;
use crate::store::ReviewItemStore;
use crate::workflow::{DecisionRequest, DecisionWorkflow};

pub const DEFAULT_PAGE_LIMIT: usize = 25;
pub const MAX_PAGE_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTab {
    #[default]
    Pending,
    Approved,
    Rejected,
    All,
}

impl StatusTab {
    pub fn status(self) -> Option<ReviewStatus> {
        match self {
            Self::Pending => Some(ReviewStatus::ReviewPending),
            Self::Approved => Some(ReviewStatus::Approved),
            Self::Rejected => Some(ReviewStatus::Rejected),
            Self::All => None,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default)]
    pub tab: StatusTab,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// The reviewer's last explicit selection.
    #[serde(default)]
    pub selected: Option<ItemId>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            tab: StatusTab::default(),
            query: None,
            content_type: None,
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
            selected: None,
        }
    }
}

impl ListFilter {
    fn matches(&self, item: &WorkItem) -> bool {
        if let Some(content_type) = self.content_type {
            if item.content_type != content_type {
                return false;
            }
        }
        self.query
            .as_deref()
            .map_or(true, |query| item.matches_query(query))
    }

    fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub items: Vec<WorkItem>,
    pub page_info: PageInfo,
    /// Effective selection for this page; `None` only when the page is empty.
    #[serde(default)]
    pub selected: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireLockResponse {
    pub lock_token: LockToken,
    pub expires_at: DateTime<Utc>,
    pub owner_id: String,
    pub owner_name: String,
    /// Item version at the moment the lease was granted.
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLockResponse {
    pub released: bool,
}

// Request and response bodies shared by the HTTP server and its client.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseLockRequest {
    pub lock_token: LockToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub version: u64,
    pub lock_token: LockToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub version: u64,
    pub lock_token: LockToken,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachMediaRequest {
    pub version: u64,
    pub lock_token: LockToken,
    pub media_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: WorkItem,
}

impl From<&ApproveRequest> for DecisionRequest {
    fn from(body: &ApproveRequest) -> Self {
        DecisionRequest::new(body.version, body.lock_token.clone())
    }
}

impl From<&RejectRequest> for DecisionRequest {
    fn from(body: &RejectRequest) -> Self {
        DecisionRequest::new(body.version, body.lock_token.clone())
    }
}

impl From<&AttachMediaRequest> for DecisionRequest {
    fn from(body: &AttachMediaRequest) -> Self {
        DecisionRequest::new(body.version, body.lock_token.clone())
    }
}

pub struct ReviewApi {
    store: Arc<ReviewItemStore>,
    locks: Arc<LockManager>,
    workflow: DecisionWorkflow,
    clock: Arc<dyn Clock>,
}

impl ReviewApi {
    pub fn new(
        store: Arc<ReviewItemStore>,
        locks: Arc<LockManager>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn PublishSink>,
    ) -> Self {
        let workflow =
            DecisionWorkflow::new(store.clone(), locks.clone(), clock.clone(), publisher);
        Self {
            store,
            locks,
            workflow,
            clock,
        }
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    fn overlay(&self, item: WorkItem) -> WorkItem {
        let lock = self.locks.holder(&item.id);
        item.with_lock(lock)
    }

    /// Upstream submission: creates the item, pending at version 1.
    pub async fn submit(&self, submission: Submission) -> Result<WorkItem, ReviewError> {
        let item = WorkItem::from_submission(submission, self.clock.now())?;
        let _section = self.store.lock_item(&item.id).await;
        self.store.insert_new(item.clone()).await?;
        info!("Submitted {} ({}) for review", item.id, item.content_type);
        Ok(item)
    }

    pub async fn list_work_items(&self, filter: &ListFilter) -> Result<ItemPage, ReviewError> {
        let matching = self
            .store
            .list(filter.tab.status(), |item| filter.matches(item))
            .await?;

        let total = matching.len();
        let limit = filter.effective_limit();
        let items: Vec<WorkItem> = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .map(|item| self.overlay(item))
            .collect();
        let has_more = filter.offset.saturating_add(items.len()) < total;

        let selected =
            effective_selection(&items, filter.selected.as_ref(), |item| &item.id).cloned();

        Ok(ItemPage {
            items,
            page_info: PageInfo {
                offset: filter.offset,
                limit,
                total,
                has_more,
            },
            selected,
        })
    }

    pub async fn get_work_item(&self, item_id: &ItemId) -> Result<WorkItem, ReviewError> {
        let item = self.store.get(item_id).await?;
        Ok(self.overlay(item))
    }

    /// Starts (or refreshes) a review of `item_id` for `holder`.
    ///
    /// Never waits for another reviewer: a held lease fails immediately with
    /// `LOCK_CONFLICT` naming the holder.
    pub async fn acquire_lock(
        &self,
        item_id: &ItemId,
        holder: &LockHolder,
    ) -> Result<AcquireLockResponse, ReviewError> {
        if holder.owner_id.trim().is_empty() {
            return Err(ReviewError::validation("ownerId must not be blank"));
        }

        let _section = self.store.lock_item(item_id).await;
        let item = self.store.get(item_id).await?;

        let grant = match self.locks.acquire(item_id, holder) {
            Ok(grant) => grant,
            Err(err) => {
                warn!("Lock on {} refused for {}: {}", item_id, holder, err);
                return Err(err);
            }
        };
        Ok(AcquireLockResponse {
            lock_token: grant.token,
            expires_at: grant.expires_at,
            owner_id: grant.holder.owner_id,
            owner_name: grant.holder.owner_name,
            version: item.version,
        })
    }

    /// Best-effort release; a stale or foreign token is a no-op.
    pub async fn release_lock(&self, item_id: &ItemId, lock_token: &LockToken) -> ReleaseLockResponse {
        let _section = self.store.lock_item(item_id).await;
        ReleaseLockResponse {
            released: self.locks.release(item_id, lock_token),
        }
    }

    pub async fn approve(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
    ) -> Result<WorkItem, ReviewError> {
        self.workflow.approve(item_id, request).await
    }

    pub async fn reject(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        reason: &str,
    ) -> Result<WorkItem, ReviewError> {
        self.workflow.reject(item_id, request, reason).await
    }

    pub async fn attach_media(
        &self,
        item_id: &ItemId,
        request: &DecisionRequest,
        media_ref: &str,
    ) -> Result<WorkItem, ReviewError> {
        self.workflow.attach_media(item_id, request, media_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::item::tests::{doc_submission, video_submission};
    use crate::publish::{ChannelPublishSink, LogPublishSink};
    use tokio::sync::Barrier;

    fn api_with_clock() -> (ReviewApi, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(ReviewItemStore::in_memory());
        let locks = Arc::new(LockManager::new(clock.clone()));
        (
            ReviewApi::new(store, locks, clock.clone(), Arc::new(LogPublishSink)),
            clock,
        )
    }

    fn api() -> ReviewApi {
        api_with_clock().0
    }

    fn alice() -> LockHolder {
        LockHolder::new("rev-a", "Alice")
    }

    fn bob() -> LockHolder {
        LockHolder::new("rev-b", "Bob")
    }

    #[tokio::test]
    async fn test_submit_creates_pending_item() {
        let api = api();
        let item = api.submit(doc_submission("d1")).await.unwrap();
        assert_eq!(item.version, 1);
        assert!(item.is_pending());

        let err = api.submit(doc_submission("d1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_acquire_lock_on_missing_item_is_not_found() {
        let api = api();
        let err = api
            .acquire_lock(&ItemId::from("ghost"), &alice())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(api.locks().active_count(), 0);
    }

    #[tokio::test]
    async fn test_reads_overlay_live_lease() {
        let api = api();
        api.submit(doc_submission("d1")).await.unwrap();
        let id = ItemId::from("d1");

        let grant = api.acquire_lock(&id, &alice()).await.unwrap();
        assert_eq!(grant.version, 1);
        let item = api.get_work_item(&id).await.unwrap();
        assert_eq!(item.lock.unwrap().owner_name, "Alice");

        let released = api.release_lock(&id, &grant.lock_token).await;
        assert!(released.released);
        assert!(api.get_work_item(&id).await.unwrap().lock.is_none());

        // Releasing twice is a quiet no-op.
        assert!(!api.release_lock(&id, &grant.lock_token).await.released);
    }

    #[tokio::test]
    async fn test_lock_expiry_hands_item_to_next_reviewer() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(ReviewItemStore::in_memory());
        let locks = Arc::new(LockManager::with_ttl(
            clock.clone(),
            std::time::Duration::from_secs(1),
        ));
        let api = ReviewApi::new(store, locks, clock.clone(), Arc::new(LogPublishSink));
        api.submit(doc_submission("d1")).await.unwrap();
        let id = ItemId::from("d1");

        let first = api.acquire_lock(&id, &alice()).await.unwrap();
        assert_eq!(
            api.acquire_lock(&id, &bob()).await.unwrap_err().code(),
            ErrorCode::LockConflict
        );

        clock.advance(chrono::Duration::milliseconds(1100));
        let second = api.acquire_lock(&id, &bob()).await.unwrap();
        assert_eq!(second.owner_id, "rev-b");

        let err = api
            .approve(&id, &DecisionRequest::new(1, first.lock_token))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LockConflict);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_grants_exactly_one() {
        let api = Arc::new(api());
        api.submit(doc_submission("d1")).await.unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let mut tasks = Vec::new();
        for holder in [alice(), bob()] {
            let api = api.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                api.acquire_lock(&ItemId::from("d1"), &holder).await
            }));
        }

        let mut granted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => granted += 1,
                Err(err) => assert_eq!(err.code(), ErrorCode::LockConflict),
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_list_filters_pages_and_selects() {
        let (api, clock) = api_with_clock();
        for i in 0..5 {
            api.submit(doc_submission(&format!("d{}", i))).await.unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }
        api.submit(video_submission("v0", None)).await.unwrap();

        let docs = ListFilter {
            content_type: Some(ContentType::PolicyDoc),
            limit: 2,
            offset: 2,
            selected: Some(ItemId::from("d3")),
            ..ListFilter::default()
        };
        let page = api.list_work_items(&docs).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d3"]);
        assert_eq!(page.page_info.total, 5);
        assert!(page.page_info.has_more);
        assert_eq!(page.selected, Some(ItemId::from("d3")));

        // The last choice is not on the approved tab, so the first item wins.
        let id = ItemId::from("d1");
        let grant = api.acquire_lock(&id, &alice()).await.unwrap();
        api.approve(&id, &DecisionRequest::new(1, grant.lock_token))
            .await
            .unwrap();
        let approved = ListFilter {
            tab: StatusTab::Approved,
            selected: Some(ItemId::from("d3")),
            ..ListFilter::default()
        };
        let page = api.list_work_items(&approved).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.selected, Some(id));

        let empty = ListFilter {
            tab: StatusTab::Rejected,
            ..ListFilter::default()
        };
        let page = api.list_work_items(&empty).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.selected, None);
    }

    #[tokio::test]
    async fn test_query_matches_title_case_insensitively() {
        let api = api();
        api.submit(doc_submission("d1")).await.unwrap();
        api.submit(video_submission("v1", None)).await.unwrap();

        let filter = ListFilter {
            tab: StatusTab::All,
            query: Some("VIDEO".to_string()),
            ..ListFilter::default()
        };
        let page = api.list_work_items(&filter).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id.as_str(), "v1");
    }

    #[tokio::test]
    async fn test_published_notice_reaches_sink() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (sink, mut published) = ChannelPublishSink::new();
        let api = ReviewApi::new(
            Arc::new(ReviewItemStore::in_memory()),
            Arc::new(LockManager::new(clock.clone())),
            clock,
            Arc::new(sink),
        );
        api.submit(doc_submission("d1")).await.unwrap();
        let id = ItemId::from("d1");

        let grant = api.acquire_lock(&id, &alice()).await.unwrap();
        let item = api
            .approve(&id, &DecisionRequest::new(grant.version, grant.lock_token))
            .await
            .unwrap();
        assert!(item.published_at.is_some());
        assert_eq!(published.recv().await.unwrap().media_or_doc_ref, "docs://d1");
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_item_sections_behind() {
        let api = api();
        api.submit(doc_submission("d1")).await.unwrap();
        let token = LockToken::from("lk_unknown");

        for i in 0..1000 {
            let id = ItemId::from(format!("ghost-{}", i));
            assert!(!api.release_lock(&id, &token).await.released);
            assert!(api
                .approve(&id, &DecisionRequest::new(1, token.clone()))
                .await
                .is_err());
            let err = api.acquire_lock(&id, &alice()).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::NotFound);
        }
        assert_eq!(api.store.section_count(), 0);

        // Real items are cleaned up once their operations finish too.
        let id = ItemId::from("d1");
        let grant = api.acquire_lock(&id, &alice()).await.unwrap();
        api.approve(&id, &DecisionRequest::new(1, grant.lock_token))
            .await
            .unwrap();
        assert_eq!(api.store.section_count(), 0);
    }
}
