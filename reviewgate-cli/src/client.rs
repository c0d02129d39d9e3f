//! HTTP client for the review gate API.
//!
//! Transport failures become `NETWORK_ERROR` and are the only failures
//! retried. Every error the server reports is surfaced as-is so the caller can
//! refetch instead of resubmitting a decision.

use std::future::Future;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::sleep;
use tracing::warn;

use reviewgate_core::{
    AcquireLockResponse, ApproveRequest, AttachMediaRequest, ErrorCode, ErrorPayload, ItemId,
    ItemPage, ItemResponse, ListFilter, LockHolder, LockToken, RejectRequest, ReleaseLockRequest,
    ReleaseLockResponse, StatusTab, Submission, WorkItem,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach the review service: {0}")]
    Network(String),
    #[error("{0}")]
    Api(ErrorPayload),
    /// A non-JSON error body, e.g. from the bearer check.
    #[error("server returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("failed to decode server response: {0}")]
    Decode(String),
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Network(_) => Some(ErrorCode::NetworkError),
            Self::Api(payload) => Some(payload.code),
            Self::Http { .. } | Self::Decode(_) | Self::InvalidUrl(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_retryable)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base, ...
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries + 1 < policy.attempts => {
                retries += 1;
                warn!(
                    "Request failed ({}), retry {} of {}",
                    e,
                    retries,
                    policy.attempts - 1
                );
                sleep(policy.delay(retries)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct ReviewClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    retry: RetryPolicy,
}

impl ReviewClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: Option<String>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            retry: RetryPolicy::default(),
        })
    }

    /// `segments` are appended to the base path, each percent-encoded as a
    /// single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()));
        }

        match serde_json::from_slice::<ErrorPayload>(&bytes) {
            Ok(payload) => Err(ClientError::Api(payload)),
            Err(_) => Err(ClientError::Http {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        with_retry(self.retry, || {
            Self::send(self.request(Method::GET, url.clone()).query(query))
        })
        .await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        with_retry(self.retry, || {
            Self::send(self.request(Method::POST, url.clone()).json(body))
        })
        .await
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<ItemPage, ClientError> {
        self.get(&["api", "items"], &list_query(filter)).await
    }

    pub async fn get_item(&self, id: &ItemId) -> Result<WorkItem, ClientError> {
        let response: ItemResponse = self.get(&["api", "items", id.as_str()], &[]).await?;
        Ok(response.item)
    }

    pub async fn submit(&self, submission: &Submission) -> Result<WorkItem, ClientError> {
        let response: ItemResponse = self.post(&["api", "items"], submission).await?;
        Ok(response.item)
    }

    pub async fn acquire_lock(
        &self,
        id: &ItemId,
        holder: &LockHolder,
    ) -> Result<AcquireLockResponse, ClientError> {
        self.post(&["api", "items", id.as_str(), "lock"], holder).await
    }

    pub async fn release_lock(
        &self,
        id: &ItemId,
        lock_token: &LockToken,
    ) -> Result<ReleaseLockResponse, ClientError> {
        let body = ReleaseLockRequest {
            lock_token: lock_token.clone(),
        };
        self.post(&["api", "items", id.as_str(), "lock", "release"], &body)
            .await
    }

    pub async fn approve(&self, id: &ItemId, body: &ApproveRequest) -> Result<WorkItem, ClientError> {
        let response: ItemResponse = self
            .post(&["api", "items", id.as_str(), "approve"], body)
            .await?;
        Ok(response.item)
    }

    pub async fn reject(&self, id: &ItemId, body: &RejectRequest) -> Result<WorkItem, ClientError> {
        let response: ItemResponse = self
            .post(&["api", "items", id.as_str(), "reject"], body)
            .await?;
        Ok(response.item)
    }

    pub async fn attach_media(
        &self,
        id: &ItemId,
        body: &AttachMediaRequest,
    ) -> Result<WorkItem, ClientError> {
        let response: ItemResponse = self
            .post(&["api", "items", id.as_str(), "media"], body)
            .await?;
        Ok(response.item)
    }
}

fn tab_name(tab: StatusTab) -> &'static str {
    match tab {
        StatusTab::Pending => "pending",
        StatusTab::Approved => "approved",
        StatusTab::Rejected => "rejected",
        StatusTab::All => "all",
    }
}

/// Query-string form of a list filter; unset fields are omitted.
pub fn list_query(filter: &ListFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("tab", tab_name(filter.tab).to_string()),
        ("offset", filter.offset.to_string()),
        ("limit", filter.limit.to_string()),
    ];
    if let Some(q) = filter.query.as_deref().filter(|q| !q.trim().is_empty()) {
        query.push(("query", q.to_string()));
    }
    if let Some(content_type) = filter.content_type {
        query.push(("contentType", content_type.as_str().to_string()));
    }
    if let Some(selected) = &filter.selected {
        query.push(("selected", selected.to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewgate_core::ContentType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn conflict() -> ClientError {
        ClientError::Api(ErrorPayload {
            code: ErrorCode::VersionConflict,
            message: "item changed".to_string(),
            current_snapshot: None,
            holder: None,
        })
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_network_errors_retried_up_to_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClientError::Network("connection refused".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_network_error_then_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ClientError::Network("reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(conflict()) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Some(ErrorCode::VersionConflict));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_list_query_omits_unset_fields() {
        let query = list_query(&ListFilter::default());
        assert_eq!(
            query,
            vec![
                ("tab", "pending".to_string()),
                ("offset", "0".to_string()),
                ("limit", "25".to_string()),
            ]
        );

        let filter = ListFilter {
            tab: StatusTab::All,
            content_type: Some(ContentType::PolicyDoc),
            selected: Some(ItemId::from("d1")),
            ..ListFilter::default()
        };
        let query = list_query(&filter);
        assert!(query.contains(&("contentType", "POLICY_DOC".to_string())));
        assert!(query.contains(&("selected", "d1".to_string())));
    }

    fn client(base_url: &str) -> ReviewClient {
        ReviewClient::new(reqwest::Client::new(), base_url, Some("  ".to_string())).unwrap()
    }

    #[test]
    fn test_base_url_is_normalised() {
        let local = client("http://localhost:3000/");
        assert_eq!(
            local.url(&["api", "items"]).unwrap().as_str(),
            "http://localhost:3000/api/items"
        );
        assert!(local.token.is_none());

        let prefixed = client("http://gateway/review/");
        assert_eq!(
            prefixed.url(&["api", "items"]).unwrap().as_str(),
            "http://gateway/review/api/items"
        );
    }

    #[test]
    fn test_item_id_is_one_encoded_segment() {
        let client = client("http://localhost:3000");
        let url = client.url(&["api", "items", "a/b c?#", "approve"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/items/a%2Fb%20c%3F%23/approve"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        for base in ["not a url", "mailto:ops@example.com"] {
            let err = ReviewClient::new(reqwest::Client::new(), base, None).err();
            assert!(matches!(err, Some(ClientError::InvalidUrl(_))), "{}", base);
        }
    }
}
