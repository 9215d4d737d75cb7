//! Service layer for Skeetsweep
//!
//! `SweepService` is the single entry point used by the CLI. It runs the
//! fetch, classify and delete stages in sequence against one [`Platform`]
//! and publishes progress on an [`EventBus`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libskeetsweep::platforms::bluesky::BlueskyClient;
//! use libskeetsweep::retention::RetentionPolicy;
//! use libskeetsweep::service::{SweepService, SweepSettings};
//! use secrecy::SecretString;
//!
//! # async fn example() -> libskeetsweep::Result<()> {
//! let mut client = BlueskyClient::new("https://bsky.social")?;
//! client
//!     .login("alice.bsky.social", &SecretString::from("app-password".to_string()))
//!     .await?;
//!
//! let service = SweepService::new(Arc::new(client), SweepSettings::default());
//! let policy = RetentionPolicy {
//!     min_likes: Some(10),
//!     protect_threads: true,
//!     ..Default::default()
//! };
//!
//! let outcome = service.sweep_posts(&policy, true).await?;
//! println!("Would delete {} posts", outcome.analysis.to_delete.len());
//! # Ok(())
//! # }
//! ```

pub mod events;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use self::events::{Event, EventBus, EventReceiver};
use crate::config::{Config, DeleteMode, MAX_BATCH_SIZE, MAX_PAGE_SIZE};
use crate::deletion::{DeletionReport, Deleter, RetryPolicy};
use crate::error::Result;
use crate::fetch::{fetch_all_posts, fetch_all_reposts, fetch_liked_uris};
use crate::platforms::Platform;
use crate::retention::{
    select_expired_reposts, select_for_deletion, PostAnalysis, RepostAnalysis, RetentionPolicy,
};
use crate::thread::cluster_threads;
use crate::types::Collection;

/// Tunables for fetching and deleting
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub page_size: u32,
    pub post_mode: DeleteMode,
    pub repost_mode: DeleteMode,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            post_mode: DeleteMode::Single,
            repost_mode: DeleteMode::Batch,
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SweepSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.service.page_size,
            post_mode: config.deletion.post_mode,
            repost_mode: config.deletion.repost_mode,
            batch_size: config.deletion.batch_size,
            retry: RetryPolicy::new(
                config.deletion.max_attempts,
                Duration::from_millis(config.deletion.retry_base_delay_ms),
            ),
        }
    }
}

/// Analysis of a run plus the deletion report, absent for dry runs
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome<A> {
    pub analysis: A,
    pub report: Option<DeletionReport>,
}

/// Main service facade
pub struct SweepService {
    platform: Arc<dyn Platform>,
    settings: SweepSettings,
    event_bus: EventBus,
}

impl SweepService {
    pub fn new(platform: Arc<dyn Platform>, settings: SweepSettings) -> Self {
        Self {
            platform,
            settings,
            event_bus: EventBus::default(),
        }
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Fetch every post and select the ones `policy` does not protect
    ///
    /// Likes are only fetched when self-like protection is on, and threads
    /// only clustered when thread protection is on.
    ///
    /// # Errors
    ///
    /// Fails without a partial result when there is no session or any page
    /// fails to load.
    pub async fn analyze_posts(&self, policy: &RetentionPolicy) -> Result<PostAnalysis> {
        let platform = self.platform.as_ref();
        let actor = platform.actor()?;
        let page_size = self.settings.page_size;

        let posts = fetch_all_posts(platform, actor, page_size, &self.event_bus).await?;

        let thread_set = if policy.protect_threads {
            cluster_threads(&posts)
        } else {
            HashSet::new()
        };
        let self_liked = if policy.protect_self_liked {
            fetch_liked_uris(platform, actor, page_size, &self.event_bus).await?
        } else {
            HashSet::new()
        };

        let analysis = select_for_deletion(&posts, policy, &thread_set, &self_liked);
        self.event_bus.emit(Event::AnalysisCompleted {
            collection: Collection::Post,
            total: analysis.total,
            to_delete: analysis.to_delete.len(),
        });
        Ok(analysis)
    }

    /// Delete the posts selected by [`Self::analyze_posts`]
    pub async fn delete_posts(&self, analysis: &PostAnalysis) -> DeletionReport {
        self.delete(Collection::Post, &analysis.to_delete, self.settings.post_mode)
            .await
    }

    /// Analyze and, unless `dry_run`, delete posts
    pub async fn sweep_posts(
        &self,
        policy: &RetentionPolicy,
        dry_run: bool,
    ) -> Result<SweepOutcome<PostAnalysis>> {
        let analysis = self.analyze_posts(policy).await?;
        let report = if dry_run {
            tracing::info!("Dry run: {} posts left in place", analysis.to_delete.len());
            None
        } else {
            Some(self.delete_posts(&analysis).await)
        };
        Ok(SweepOutcome { analysis, report })
    }

    /// Fetch every repost and select the ones created before `cutoff`
    pub async fn analyze_reposts(&self, cutoff: NaiveDate) -> Result<RepostAnalysis> {
        let platform = self.platform.as_ref();
        let repo = platform.actor()?;

        let reposts =
            fetch_all_reposts(platform, repo, self.settings.page_size, &self.event_bus).await?;
        let analysis = select_expired_reposts(&reposts, cutoff);

        self.event_bus.emit(Event::AnalysisCompleted {
            collection: Collection::Repost,
            total: analysis.total,
            to_delete: analysis.to_delete.len(),
        });
        Ok(analysis)
    }

    /// Delete the reposts selected by [`Self::analyze_reposts`]
    pub async fn delete_reposts(&self, analysis: &RepostAnalysis) -> DeletionReport {
        self.delete(
            Collection::Repost,
            &analysis.to_delete,
            self.settings.repost_mode,
        )
        .await
    }

    /// Analyze and, unless `dry_run`, delete reposts older than `cutoff`
    pub async fn retire_reposts(
        &self,
        cutoff: NaiveDate,
        dry_run: bool,
    ) -> Result<SweepOutcome<RepostAnalysis>> {
        let analysis = self.analyze_reposts(cutoff).await?;
        let report = if dry_run {
            tracing::info!("Dry run: {} reposts left in place", analysis.to_delete.len());
            None
        } else {
            Some(self.delete_reposts(&analysis).await)
        };
        Ok(SweepOutcome { analysis, report })
    }

    async fn delete(
        &self,
        collection: Collection,
        uris: &[String],
        mode: DeleteMode,
    ) -> DeletionReport {
        let report = Deleter::new(self.platform.as_ref(), mode)
            .with_batch_size(self.settings.batch_size)
            .with_retry(self.settings.retry)
            .delete_all(uris, &self.event_bus)
            .await;

        self.event_bus.emit(Event::SweepCompleted {
            collection,
            succeeded: report.succeeded,
            failed: report.failed,
        });
        report
    }
}
