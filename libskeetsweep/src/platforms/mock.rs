//! Mock platform implementation for testing
//!
//! Serves scripted pages for each collection and records every delete it
//! receives. Failures can be injected per fetch page, per record key, per
//! batch call, or as a number of transient errors before calls succeed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{Collection, Page, Post, RecordUri, Repost};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name
    pub name: String,

    /// DID reported by `actor()`; `None` simulates a missing session
    pub actor: Option<String>,

    /// Author feed, one entry per page
    pub post_pages: Vec<Vec<Post>>,

    /// Liked post URIs, one entry per page
    pub like_pages: Vec<Vec<String>>,

    /// Repost records, one entry per page
    pub repost_pages: Vec<Vec<Repost>>,

    /// Return `Some("")` instead of `None` as the cursor of the last page
    pub empty_final_cursor: bool,

    /// Fail the fetch of page N of the given collection
    pub fail_fetch_at: Option<(Collection, usize)>,

    /// Record keys whose deletion is permanently rejected
    pub failing_rkeys: Vec<String>,

    /// Zero-based indices of `apply_deletes` calls that are rejected
    pub failing_batches: Vec<usize>,

    /// Number of delete calls that fail with a network error before calls
    /// start succeeding
    pub transient_failures: Arc<Mutex<usize>>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Every page request as (collection, cursor)
    pub fetch_calls: Arc<Mutex<Vec<(Collection, Option<String>)>>>,

    /// Number of `delete_record` calls, including failed ones
    pub delete_call_count: Arc<Mutex<usize>>,

    /// Size of every `apply_deletes` call, including failed ones
    pub batch_sizes: Arc<Mutex<Vec<usize>>>,

    /// URIs that were actually deleted, in order
    pub deleted: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            actor: Some("did:plc:mock".to_string()),
            post_pages: Vec::new(),
            like_pages: Vec::new(),
            repost_pages: Vec::new(),
            empty_final_cursor: false,
            fail_fetch_at: None,
            failing_rkeys: Vec::new(),
            failing_batches: Vec::new(),
            transient_failures: Arc::new(Mutex::new(0)),
            delay: Duration::from_millis(0),
            fetch_calls: Arc::new(Mutex::new(Vec::new())),
            delete_call_count: Arc::new(Mutex::new(0)),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Split `items` into pages of at most `page_size`
pub fn paginate<T: Clone>(items: &[T], page_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(page_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform with no content that accepts every delete
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform serving the given author feed and likes
    pub fn with_posts(post_pages: Vec<Vec<Post>>, like_pages: Vec<Vec<String>>) -> Self {
        Self::new(MockConfig {
            post_pages,
            like_pages,
            ..Default::default()
        })
    }

    /// Create a mock platform serving the given repost records
    pub fn with_reposts(repost_pages: Vec<Vec<Repost>>) -> Self {
        Self::new(MockConfig {
            repost_pages,
            ..Default::default()
        })
    }

    /// Create a mock platform without a session
    pub fn unauthenticated(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            actor: None,
            ..Default::default()
        })
    }

    /// Get every page request made so far
    pub fn fetch_calls(&self) -> Vec<(Collection, Option<String>)> {
        self.config.fetch_calls.lock().unwrap().clone()
    }

    /// Get the number of times delete_record was called
    pub fn delete_call_count(&self) -> usize {
        *self.config.delete_call_count.lock().unwrap()
    }

    /// Get the size of every batch call made so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.config.batch_sizes.lock().unwrap().clone()
    }

    /// Get all URIs that were deleted
    pub fn deleted(&self) -> Vec<String> {
        self.config.deleted.lock().unwrap().clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn serve_page<T: Clone>(
        &self,
        collection: Collection,
        pages: &[Vec<T>],
        cursor: Option<&str>,
    ) -> Result<Page<T>> {
        self.config
            .fetch_calls
            .lock()
            .unwrap()
            .push((collection, cursor.map(str::to_string)));

        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("cursor-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    PlatformError::Fetch(format!("Unknown cursor '{}' for {}", cursor, collection))
                })?,
        };

        if self.config.fail_fetch_at == Some((collection, index)) {
            return Err(PlatformError::Fetch(format!(
                "Mock fetch failure on {} page {}",
                collection, index
            ))
            .into());
        }

        let items = pages.get(index).cloned().unwrap_or_default();
        let cursor = if index + 1 < pages.len() {
            Some(format!("cursor-{}", index + 1))
        } else if self.config.empty_final_cursor {
            Some(String::new())
        } else {
            None
        };
        Ok(Page::new(items, cursor))
    }

    /// Consume one scripted transient failure, if any remain
    fn take_transient_failure(&self) -> Option<PlatformError> {
        let mut remaining = self.config.transient_failures.lock().unwrap();
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(PlatformError::Network(
            "Mock connection reset by peer".to_string(),
        ))
    }

    fn rejects(&self, target: &RecordUri) -> bool {
        self.config.failing_rkeys.contains(&target.rkey)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn actor(&self) -> Result<&str> {
        self.config
            .actor
            .as_deref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }

    async fn author_feed_page(
        &self,
        _actor: &str,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page<Post>> {
        self.simulate_latency().await;
        self.serve_page(Collection::Post, &self.config.post_pages, cursor)
    }

    async fn actor_likes_page(
        &self,
        _actor: &str,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page<String>> {
        self.simulate_latency().await;
        self.serve_page(Collection::Like, &self.config.like_pages, cursor)
    }

    async fn list_reposts_page(
        &self,
        _repo: &str,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page<Repost>> {
        self.simulate_latency().await;
        self.serve_page(Collection::Repost, &self.config.repost_pages, cursor)
    }

    async fn delete_record(&self, target: &RecordUri) -> Result<()> {
        *self.config.delete_call_count.lock().unwrap() += 1;
        self.simulate_latency().await;

        if let Some(error) = self.take_transient_failure() {
            return Err(error.into());
        }
        if self.rejects(target) {
            return Err(PlatformError::Delete(format!("Mock rejected {}", target)).into());
        }

        self.config.deleted.lock().unwrap().push(target.to_string());
        Ok(())
    }

    async fn apply_deletes(&self, repo: &str, targets: &[RecordUri]) -> Result<()> {
        let call_index = {
            let mut sizes = self.config.batch_sizes.lock().unwrap();
            sizes.push(targets.len());
            sizes.len() - 1
        };
        self.simulate_latency().await;

        if let Some(foreign) = targets.iter().find(|t| t.repo != repo) {
            return Err(PlatformError::Validation(format!(
                "{} does not belong to repo {}",
                foreign, repo
            ))
            .into());
        }
        if let Some(error) = self.take_transient_failure() {
            return Err(error.into());
        }
        if self.config.failing_batches.contains(&call_index) {
            return Err(
                PlatformError::Delete(format!("Mock rejected batch {}", call_index)).into(),
            );
        }
        if let Some(rejected) = targets.iter().find(|t| self.rejects(t)) {
            return Err(PlatformError::Delete(format!("Mock rejected {}", rejected)).into());
        }

        self.config
            .deleted
            .lock()
            .unwrap()
            .extend(targets.iter().map(RecordUri::to_string));
        Ok(())
    }
}
