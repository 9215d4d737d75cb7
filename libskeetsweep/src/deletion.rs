//! Record deletion with progress reporting and retry
//!
//! Deletes are issued strictly in sequence, either one `deleteRecord` call
//! per record or `applyWrites` batches. A failure is recorded and the run
//! moves on; only transient failures are retried.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{DeleteMode, MAX_BATCH_SIZE};
use crate::error::Result;
use crate::platforms::Platform;
use crate::service::events::ProgressObserver;
use crate::types::RecordUri;

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Run `call` until it succeeds, fails permanently or runs out of attempts
async fn with_retry<F, Fut>(retry: &RetryPolicy, target: &str, mut call: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Deleted {} on attempt {}", target, attempt);
                }
                return Ok(());
            }
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay_after(attempt);
                warn!(
                    "Transient error deleting {} (attempt {}/{}): {}. Retrying in {:?}...",
                    target, attempt, retry.max_attempts, e, delay
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    warn!("Failed to delete {} after {} attempts: {}", target, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

/// A record that could not be deleted
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeleteFailure {
    pub uri: String,
    pub error: String,
}

/// Counters for one deletion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<DeleteFailure>,
}

impl DeletionReport {
    fn record_failure(&mut self, uri: String, error: String, observer: &dyn ProgressObserver) {
        warn!("Could not delete {}: {}", uri, error);
        observer.delete_failed(&uri, &error);
        self.failed += 1;
        self.failures.push(DeleteFailure { uri, error });
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Split `targets` into batches of at most `batch_size` that never span
/// more than one repo
pub fn plan_batches(targets: &[RecordUri], batch_size: usize) -> Vec<&[RecordUri]> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut start = 0;

    for end in 1..=targets.len() {
        let boundary = end == targets.len()
            || end - start == batch_size
            || targets[end].repo != targets[start].repo;
        if boundary {
            batches.push(&targets[start..end]);
            start = end;
        }
    }
    batches
}

/// Turns a list of record URIs into delete calls
pub struct Deleter<'a> {
    platform: &'a dyn Platform,
    mode: DeleteMode,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<'a> Deleter<'a> {
    pub fn new(platform: &'a dyn Platform, mode: DeleteMode) -> Self {
        Self {
            platform,
            mode,
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Largest `applyWrites` batch; clamped to 1..=200
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Delete every URI in order
    ///
    /// URIs that do not parse count as failures. Failed calls are recorded in
    /// the report and never stop the run.
    pub async fn delete_all(
        &self,
        uris: &[String],
        observer: &dyn ProgressObserver,
    ) -> DeletionReport {
        let mut report = DeletionReport {
            attempted: uris.len(),
            ..Default::default()
        };
        if uris.is_empty() {
            return report;
        }

        info!(
            "Deleting {} records via {} ({} mode)",
            uris.len(),
            self.platform.name(),
            match self.mode {
                DeleteMode::Single => "single",
                DeleteMode::Batch => "batch",
            }
        );

        match self.mode {
            DeleteMode::Single => self.delete_singly(uris, observer, &mut report).await,
            DeleteMode::Batch => self.delete_batched(uris, observer, &mut report).await,
        }

        info!(
            "Deletion finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        report
    }

    async fn delete_singly(
        &self,
        uris: &[String],
        observer: &dyn ProgressObserver,
        report: &mut DeletionReport,
    ) {
        let total = uris.len();
        for (index, uri) in uris.iter().enumerate() {
            match RecordUri::parse(uri) {
                Ok(target) => {
                    let result = with_retry(&self.retry, uri, || {
                        self.platform.delete_record(&target)
                    })
                    .await;
                    match result {
                        Ok(()) => report.succeeded += 1,
                        Err(e) => report.record_failure(uri.clone(), e.to_string(), observer),
                    }
                }
                Err(e) => report.record_failure(uri.clone(), e.to_string(), observer),
            }
            observer.deleted(index + 1, total);
        }
    }

    async fn delete_batched(
        &self,
        uris: &[String],
        observer: &dyn ProgressObserver,
        report: &mut DeletionReport,
    ) {
        let total = uris.len();
        let mut targets = Vec::with_capacity(total);
        for uri in uris {
            match RecordUri::parse(uri) {
                Ok(target) => targets.push(target),
                Err(e) => report.record_failure(uri.clone(), e.to_string(), observer),
            }
        }

        let mut completed = report.failed;
        let batches = plan_batches(&targets, self.batch_size);
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let repo = batch[0].repo.as_str();
            let label = format!("batch {}/{} ({} records)", index + 1, batch_count, batch.len());
            let result = with_retry(&self.retry, &label, || {
                self.platform.apply_deletes(repo, batch)
            })
            .await;

            match result {
                Ok(()) => report.succeeded += batch.len(),
                Err(e) => {
                    // Partial application is unknowable, so the whole batch counts as failed
                    let error = e.to_string();
                    for target in batch {
                        report.record_failure(target.to_string(), error.clone(), observer);
                    }
                }
            }

            completed += batch.len();
            observer.deleted(completed, total);
        }
    }
}
