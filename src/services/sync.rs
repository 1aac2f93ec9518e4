// SPDX-License-Identifier: MIT

//! Sync orchestration.
//!
//! Drives the end-to-end loop: load checkpoint → list source activities →
//! filter against existing Garmin windows → download, spoof, upload →
//! advance checkpoint. Processing stays strictly oldest-first because the
//! checkpoint is a single scalar watermark: it may only advance past a
//! contiguous prefix of fully-processed activities.

use crate::error::{Result, SyncError};
use crate::fit;
use crate::fit::spoof::{self, DeviceIdentity};
use crate::models::{ActivityWindow, SourceActivity, SyncCheckpoint};
use crate::services::overlap;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Source platform (iGPSport): discovery and FIT download.
pub trait SourceService {
    fn list_activities(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SourceActivity>>> + Send;

    fn download_fit(
        &self,
        activity: &SourceActivity,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Target platform (Garmin Connect): existing windows and upload.
pub trait TargetService {
    fn list_windows(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityWindow>>> + Send;

    fn upload_fit(&self, fit_data: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

/// Persisted last-sync watermark.
pub trait CheckpointStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>>;
    fn save(&self, last_sync_date: DateTime<Utc>) -> Result<()>;
}

/// Bounded exponential backoff applied uniformly to remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per operation (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each retry.
    pub base_delay: Duration,
    /// Pause after each successful upload to stay under rate limits.
    pub upload_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
            upload_pause: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            upload_pause: Duration::ZERO,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run a remote operation, retrying transient failures with backoff.
/// Auth and decode errors are surfaced immediately.
pub async fn with_retry<T, F, Fut>(op: &str, policy: &RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    op,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Terminal state of a completed (non-fatal) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every discovered activity was uploaded, deduplicated, or permanently
    /// skipped; the checkpoint covers the whole batch.
    Completed,
    /// At least one transfer failed after retries; the checkpoint stops at
    /// the last activity of the contiguous successful prefix.
    PartialFailure,
}

/// Run summary. Fatal failures (auth, listing) surface as `Err` from
/// [`SyncOrchestrator::run`] instead.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Activities newer than the checkpoint on the source platform.
    pub discovered: usize,
    pub uploaded: usize,
    /// Skipped: already present on the target (window overlap).
    pub duplicates: usize,
    /// Skipped: FIT file failed to decode.
    pub invalid: usize,
    /// Transfers that failed after retries.
    pub failed: usize,
    /// New checkpoint value, if it advanced.
    pub checkpoint: Option<DateTime<Utc>>,
}

impl SyncReport {
    /// True when the source had nothing newer than the checkpoint.
    pub fn nothing_new(&self) -> bool {
        self.discovered == 0
    }
}

/// The sync control loop, generic over its collaborators so the whole state
/// machine is testable without a network.
pub struct SyncOrchestrator<S, T, C> {
    source: S,
    target: T,
    checkpoint: C,
    identity: DeviceIdentity,
    overlap_buffer: chrono::Duration,
    retry: RetryPolicy,
}

impl<S, T, C> SyncOrchestrator<S, T, C>
where
    S: SourceService,
    T: TargetService,
    C: CheckpointStore,
{
    pub fn new(source: S, target: T, checkpoint: C) -> Self {
        Self {
            source,
            target,
            checkpoint,
            identity: spoof::GARMIN_EDGE_830,
            overlap_buffer: overlap::default_overlap_buffer(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_overlap_buffer(mut self, buffer: chrono::Duration) -> Self {
        self.overlap_buffer = buffer;
        self
    }

    /// Execute one sync run.
    pub async fn run(&self) -> Result<SyncReport> {
        let since = match self.checkpoint.load()? {
            Some(ts) => ts,
            None => SyncCheckpoint::default_since(Utc::now()),
        };
        tracing::info!(since = %since, "Starting sync run");

        // Discover: oldest first, strictly newer than the checkpoint.
        let mut activities = with_retry("list source activities", &self.retry, || {
            self.source.list_activities(since)
        })
        .await?;
        activities.retain(|a| a.start > since);
        activities.sort_by_key(|a| a.start);

        if activities.is_empty() {
            tracing::info!("No new activities to sync");
            return Ok(SyncReport {
                outcome: SyncOutcome::Completed,
                discovered: 0,
                uploaded: 0,
                duplicates: 0,
                invalid: 0,
                failed: 0,
                checkpoint: None,
            });
        }
        tracing::info!(count = activities.len(), "Discovered new source activities");

        // Existing Garmin windows over the candidate range, padded so an
        // activity just before the checkpoint still participates in dedup.
        let existing = with_retry("list target activities", &self.retry, || {
            self.target.list_windows(since - self.overlap_buffer)
        })
        .await?;

        let mut uploaded = 0usize;
        let mut duplicates = 0usize;
        let mut invalid = 0usize;
        let mut failed = 0usize;
        // Watermark advances only through the contiguous prefix of
        // activities that no future run needs to revisit. A transient
        // failure freezes it; later successes still upload but the next
        // run re-discovers (and re-deduplicates) them.
        let mut watermark: Option<DateTime<Utc>> = None;
        let mut frozen = false;

        for activity in &activities {
            if overlap::is_duplicate(&activity.window(), &existing, self.overlap_buffer) {
                tracing::info!(
                    activity_id = activity.id,
                    start = %activity.start,
                    "Skipping activity already present on Garmin"
                );
                duplicates += 1;
                if !frozen {
                    watermark = Some(activity.start);
                }
                continue;
            }

            match self.transfer(activity).await {
                Ok(()) => {
                    uploaded += 1;
                    if !frozen {
                        watermark = Some(activity.start);
                    }
                    tokio::time::sleep(self.retry.upload_pause).await;
                }
                Err(SyncError::Decode(e)) => {
                    // Corrupt files never become valid; skipping them is
                    // final, so the watermark may pass them.
                    tracing::warn!(
                        activity_id = activity.id,
                        error = %e,
                        "FIT file failed to decode, skipping activity"
                    );
                    invalid += 1;
                    if !frozen {
                        watermark = Some(activity.start);
                    }
                }
                Err(e @ SyncError::Auth(_)) => {
                    // Commit the prefix that succeeded, then abort.
                    self.commit(since, watermark)?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        activity_id = activity.id,
                        error = %e,
                        "Transfer failed after retries, checkpoint withheld"
                    );
                    failed += 1;
                    frozen = true;
                }
            }
        }

        let checkpoint = self.commit(since, watermark)?;

        let outcome = if failed > 0 {
            SyncOutcome::PartialFailure
        } else {
            SyncOutcome::Completed
        };
        let report = SyncReport {
            outcome,
            discovered: activities.len(),
            uploaded,
            duplicates,
            invalid,
            failed,
            checkpoint,
        };
        tracing::info!(
            uploaded = report.uploaded,
            duplicates = report.duplicates,
            invalid = report.invalid,
            failed = report.failed,
            checkpoint = ?report.checkpoint,
            "Sync run finished"
        );
        Ok(report)
    }

    /// Download → decode → spoof → encode → upload for one activity.
    async fn transfer(&self, activity: &SourceActivity) -> Result<()> {
        tracing::info!(
            activity_id = activity.id,
            start = %activity.start,
            "Transferring activity"
        );

        let fit_data = with_retry("download FIT file", &self.retry, || {
            self.source.download_fit(activity)
        })
        .await?;

        let mut messages = fit::decode(&fit_data)?;
        spoof::apply(&mut messages, &self.identity);
        let spoofed = fit::encode(&messages);

        with_retry("upload FIT file", &self.retry, || {
            self.target.upload_fit(spoofed.clone())
        })
        .await?;

        tracing::info!(
            activity_id = activity.id,
            bytes = spoofed.len(),
            "Activity uploaded to Garmin"
        );
        Ok(())
    }

    /// Persist the watermark if it moved forward. Returns the committed
    /// value, keeping the checkpoint monotonic.
    fn commit(
        &self,
        since: DateTime<Utc>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>> {
        match watermark {
            Some(ts) if ts > since => {
                self.checkpoint.save(ts)?;
                tracing::info!(checkpoint = %ts, "Checkpoint advanced");
                Ok(Some(ts))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(4);

        let result: Result<u32> = with_retry("op", &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(SyncError::Network("flaky".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result: Result<()> = with_retry("op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Network("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_never_retries_auth_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<()> = with_retry("op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Auth("bad credentials".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
            upload_pause: Duration::ZERO,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(20));
    }
}
